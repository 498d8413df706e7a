//! Recognise known daemon conditions from untyped error text.
//!
//! Both the API wording (`Error response from daemon: ...`) and the newer
//! CLI wording (`Error: No such ...`) are accepted.

use std::sync::LazyLock;

use regex::Regex;

use super::daemon::DaemonError;

static NAME_CONFLICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Conflict\. The container name "/?[^"]+" is already in use by container"#)
        .expect("valid regex")
});

static IMAGE_NOT_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)no such image: ").expect("valid regex"));

static NETWORK_NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(network [^"\s]+ not found|no such network: )"#).expect("valid regex")
});

/// A container with the requested name already exists.
pub fn is_name_conflict(err: &DaemonError) -> bool {
    NAME_CONFLICT.is_match(&err.message)
}

/// The image is not present locally.
pub fn is_image_not_found(err: &DaemonError) -> bool {
    IMAGE_NOT_FOUND.is_match(&err.message)
}

/// The network does not exist.
pub fn is_network_not_found(err: &DaemonError) -> bool {
    NETWORK_NOT_FOUND.is_match(&err.message)
}
