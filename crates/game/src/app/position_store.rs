use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine::Vec2;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The sole durable artifact of the map: `{x, y}` per account. Anything
/// that does not parse as exactly that is discarded in favour of the home
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PositionRecord {
    x: f64,
    y: f64,
}

/// Per-account avatar position records, one JSON file each, written
/// atomically. Saves are fire-and-forget: a failed write costs at most the
/// last few steps after a restart, never the session.
pub struct PositionStore {
    dir: PathBuf,
}

impl PositionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn load(&self, account: &str) -> Option<Vec2> {
        let path = self.record_path(account);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "position_record_unreadable");
                return None;
            }
        };

        let mut deserializer = serde_json::Deserializer::from_str(&raw);
        let record: PositionRecord =
            match serde_path_to_error::deserialize(&mut deserializer) {
                Ok(record) => record,
                Err(error) => {
                    let at = error.path().to_string();
                    let source = error.into_inner();
                    warn!(
                        path = %path.display(),
                        at = %at,
                        error = %source,
                        "position_record_corrupt"
                    );
                    return None;
                }
            };

        if !record.x.is_finite() || !record.y.is_finite() {
            warn!(path = %path.display(), "position_record_not_finite");
            return None;
        }
        Some(Vec2::new(record.x, record.y))
    }

    pub fn save(&self, account: &str, position: Vec2) {
        let record = PositionRecord {
            x: position.x,
            y: position.y,
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(error) => {
                warn!(error = %error, "position_record_encode_failed");
                return;
            }
        };
        let path = self.record_path(account);
        if let Err(error) = write_text_atomic(&path, &json) {
            warn!(path = %path.display(), error = %error, "position_record_write_failed");
        }
    }

    fn record_path(&self, account: &str) -> PathBuf {
        self.dir
            .join(format!("position_{}.json", sanitize_account(account)))
    }
}

/// Account ids come from an external auth layer; keep the file name tame
/// whatever they contain.
fn sanitize_account(account: &str) -> String {
    account
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text)?;
    replace_file(&tmp_path, path)
}

fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    match fs::remove_file(final_path) {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(tmp_path);
            return Err(error);
        }
    }

    if let Err(error) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("position.tmp");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}
