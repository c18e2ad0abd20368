pub mod ad_service;
pub mod api_client;
pub mod countdown;
pub mod dispatcher;
pub mod intent_capture;
pub mod pending_store;
pub mod redirect_flow;
pub mod session_storage;
pub mod verification;

pub use ad_service::{AdService, AdSource};
pub use api_client::ApiClient;
pub use countdown::{Countdown, Tick};
pub use dispatcher::{DownloadDispatcher, NavigationRequest, Navigator, SystemBrowser};
pub use intent_capture::capture_download;
pub use pending_store::PendingDownloadStore;
pub use redirect_flow::{FailureKind, FlowEvent, FlowFailure, FlowState, RedirectFlow};
pub use session_storage::{MemorySessionStorage, SessionStorage, SqliteSessionStorage};
pub use verification::{VerificationClient, ViewVerifier};
