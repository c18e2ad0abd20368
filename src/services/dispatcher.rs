use std::io;
#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::DispatchError;
use crate::models::{PendingDownload, UnlockGrant};
use crate::services::PendingDownloadStore;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationRequest {
    pub url: String,
    pub unlock_token: String,
}

/// Hands a released download to whatever owns the actual transfer.
pub trait Navigator: Send + Sync {
    fn navigate(&self, request: &NavigationRequest) -> io::Result<()>;
}

/// Opens the download URL with the platform's default handler.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemBrowser;

impl Navigator for SystemBrowser {
    fn navigate(&self, request: &NavigationRequest) -> io::Result<()> {
        let mut command = opener_command(&request.url);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command.spawn().map(|_| ())
    }
}

fn opener_command(url: &str) -> Command {
    #[cfg(target_os = "windows")]
    {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", url]);
        command.creation_flags(CREATE_NO_WINDOW);
        command
    }
    #[cfg(target_os = "macos")]
    {
        let mut command = Command::new("open");
        command.arg(url);
        command
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    }
}

/// Releases one download per flow and empties the pending slot afterwards,
/// whether or not the navigator could confirm the hand-off.
pub struct DownloadDispatcher<N> {
    navigator: N,
    store: PendingDownloadStore,
    dispatched: AtomicBool,
}

impl<N: Navigator> DownloadDispatcher<N> {
    pub fn new(navigator: N, store: PendingDownloadStore) -> Self {
        Self {
            navigator,
            store,
            dispatched: AtomicBool::new(false),
        }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn has_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::SeqCst)
    }

    pub fn dispatch(
        &self,
        grant: &UnlockGrant,
        pending: &PendingDownload,
    ) -> Result<(), DispatchError> {
        if grant.unlock_token.trim().is_empty() {
            return Err(DispatchError::InvalidGrant("empty unlock token".to_string()));
        }
        if grant.is_expired_at(chrono::Utc::now()) {
            return Err(DispatchError::InvalidGrant(format!(
                "unlock token expired at {}",
                grant.expires_at.to_rfc3339()
            )));
        }
        if self.dispatched.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyDispatched);
        }

        let request = NavigationRequest {
            url: pending.url.clone(),
            unlock_token: grant.unlock_token.clone(),
        };
        match self.navigator.navigate(&request) {
            Ok(()) => tracing::info!(app = %pending.app_name, "download dispatched"),
            Err(err) => tracing::warn!(
                app = %pending.app_name,
                "download dispatched but navigation could not be confirmed: {}",
                err
            ),
        }

        if let Err(err) = self.store.clear() {
            tracing::warn!("failed to clear pending download after dispatch: {}", err);
        }
        Ok(())
    }
}
