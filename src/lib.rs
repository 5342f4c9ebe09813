pub mod api;
pub mod error;
pub mod events;
pub mod geometry;
pub mod overlay;
pub mod response;
pub mod runtime;
pub mod selection;
pub mod settings;
pub mod speech;
pub mod utils;
pub mod visibility;

use std::path::PathBuf;

use anyhow::Result;

pub use api::{AssistApi, HttpAssistClient, LimitStatus, SpeakOptions};
pub use error::{AssistError, AssistResult};
pub use events::{LifecycleBus, PopupEvent};
pub use geometry::{Point, Rect, Size, Viewport};
pub use overlay::{HighlightBlock, OverlayNodeId, OverlayRenderer, OverlaySurface};
pub use response::{ResponseController, ResponseSnapshot, ResponseStatus, SubmitOutcome};
pub use runtime::{AssistRuntime, PageEvent};
pub use selection::{LiveSelection, PageContext, PageHost, SelectionSnapshot};
pub use settings::{Settings, SettingsStore};
pub use speech::{AudioOutput, SpeechController, SpeechStatus};

/// Loads settings from `settings_path`, installs the logger and connects a
/// runtime for one page.
pub fn start<H: PageHost, S: OverlaySurface>(
    host: H,
    surface: S,
    settings_path: PathBuf,
) -> Result<AssistRuntime<H, S>> {
    let store = SettingsStore::new(settings_path)?;
    let settings = store.get()?;
    utils::logging::init(settings.debug);
    log::info!("inkling starting (model {})", settings.model);
    AssistRuntime::connect(host, surface, &settings)
}
