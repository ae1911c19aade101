//! Presenting the OAuth consent URL to a human

use std::io;

/// Host-specific way of opening the consent page
///
/// Implementations never decide whether authorization succeeds; a failure to
/// launch only means the user has to open the printed URL by hand.
pub trait ConsentLauncher: Send + Sync {
    fn launch(&self, url: &str) -> io::Result<()>;
}

/// Opens the default browser of the host (xdg-open, open, start, wslview, ...)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl ConsentLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> io::Result<()> {
        open::that_detached(url)
    }
}

/// Never starts a process; relies on the printed URL alone
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintOnly;

impl ConsentLauncher for PrintOnly {
    fn launch(&self, _url: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Print the consent URL and make a best-effort attempt to open it
///
/// Output goes to stderr so an MCP client reading stdout is unaffected.
pub fn present_consent_url(launcher: &dyn ConsentLauncher, url: &str) {
    eprintln!(
        "\nPlease visit this URL to authorize Gmail access:\n\n    {}\n",
        url
    );

    match launcher.launch(url) {
        Ok(()) => tracing::info!("Waiting for authorization in the browser"),
        Err(e) => tracing::warn!(
            "Could not open a browser ({}); open the URL above manually",
            e
        ),
    }
}
