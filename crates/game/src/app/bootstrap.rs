use std::env;

use engine::map::MANIFEST_FILE;
use engine::{resolve_app_paths, run_app, LoopConfig, MapManifest, RendererConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use super::overworld::OverworldScene;
use super::position_store::PositionStore;
use super::spawn::Species;

pub const ACCOUNT_ENV_VAR: &str = "OVERWORLD_ACCOUNT";
const DEFAULT_ACCOUNT: &str = "local";

/// Catalog slice used for initial placement: the weak early-game pool. The
/// full catalog lives behind the backend; only identity matters here.
const STARTER_SPECIES: [(u32, &str); 20] = [
    (746, "Wishiwashi"),
    (191, "Sunkern"),
    (824, "Blipbug"),
    (872, "Snom"),
    (298, "Azurill"),
    (401, "Kricketot"),
    (10, "Caterpie"),
    (265, "Wurmple"),
    (13, "Weedle"),
    (280, "Ralts"),
    (664, "Scatterbug"),
    (129, "Magikarp"),
    (789, "Cosmog"),
    (349, "Feebas"),
    (266, "Silcoon"),
    (11, "Metapod"),
    (268, "Cascoon"),
    (172, "Pichu"),
    (14, "Kakuna"),
    (194, "Wooper"),
];

pub fn run() -> Result<(), String> {
    let paths = resolve_app_paths().map_err(|error| error.to_string())?;
    let manifest = MapManifest::load_or_default(&paths.assets_dir.join(MANIFEST_FILE))
        .map_err(|error| error.to_string())?;
    let account = env::var(ACCOUNT_ENV_VAR).unwrap_or_else(|_| DEFAULT_ACCOUNT.to_string());

    info!(
        root = %paths.root.display(),
        assets_dir = %paths.assets_dir.display(),
        cache_dir = %paths.cache_dir.display(),
        account = %account,
        map_width = manifest.map_width,
        map_height = manifest.map_height,
        tile_size = manifest.tile_size,
        "startup"
    );

    let store = PositionStore::new(paths.cache_dir.join("saves"));
    let species = STARTER_SPECIES
        .iter()
        .map(|(id, name)| Species {
            id: *id,
            name: (*name).to_string(),
        })
        .collect();

    let renderer_config = RendererConfig {
        sprite_sheet_path: paths.assets_dir.join(&manifest.sprite_sheet_path),
        frame_width: manifest.sprite_frame_width,
        frame_height: manifest.sprite_frame_height,
    };

    let scene = OverworldScene::new(
        &manifest,
        &paths.assets_dir,
        store,
        account,
        species,
        StdRng::from_entropy(),
    );

    run_app(LoopConfig::default(), renderer_config, Box::new(scene))
        .map_err(|error| error.to_string())
}
