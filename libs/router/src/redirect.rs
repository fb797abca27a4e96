/// Status used when none is given
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

/// Where to send the client, and with which status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
    pub status: u16,
}

/// Resolve `url` against the site `base` with the default 302 status
///
/// Absolute `http://` and `https://` URLs are kept as they are. Anything
/// else is taken relative to `base`.
pub fn redirect(base: &str, url: &str) -> Redirect {
    redirect_with_status(base, url, DEFAULT_REDIRECT_STATUS)
}

pub fn redirect_with_status(base: &str, url: &str, status: u16) -> Redirect {
    let location = if is_absolute(url) {
        url.to_string()
    } else {
        let relative = url.strip_prefix('/').unwrap_or(url);
        if base.ends_with('/') {
            format!("{base}{relative}")
        } else {
            format!("{base}/{relative}")
        }
    };

    Redirect { location, status }
}

fn is_absolute(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
