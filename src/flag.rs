use std::path::PathBuf;

/// Binary control signal readable by any process without a live connection.
///
/// Both the client's stop request and the mock server's forced-failure switch
/// are toggled externally by creating or removing a sentinel file. The flag is
/// polled, never pushed: detection latency is bounded by the poll cadence of
/// the caller.
pub trait ControlFlag: Send + Sync + 'static {
    fn is_raised(&self) -> bool;
}

/// [`ControlFlag`] backed by the existence of a file at a fixed path.
#[derive(Debug, Clone)]
pub struct FileFlag {
    path: PathBuf,
}

impl FileFlag {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ControlFlag for FileFlag {
    fn is_raised(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
pub(crate) use tests::StaticFlag;
