use std::path::PathBuf;

/// error type for metaconv operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown metadata type: {0}")]
    UnknownType(String),

    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("missing metadata descriptor for {0}")]
    MissingDescriptor(PathBuf),

    #[error("missing content for {component}: expected a file or directory next to {descriptor}")]
    MissingContent {
        component: String,
        descriptor: PathBuf,
    },

    #[error("{component}: descriptor {descriptor} does not declare a contentType")]
    MissingContentType {
        component: String,
        descriptor: PathBuf,
    },

    #[error("{component}: expected an archive type but found one of {content_type}")]
    ExpectedArchive {
        component: String,
        content_type: String,
    },

    #[error("invalid archive entry name in {archive}: {name}")]
    InvalidArchiveEntry { archive: PathBuf, name: String },

    #[error("invalid package manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("xml error in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("invalid registry data: {0}")]
    Registry(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip error at {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid write destination: {0}")]
    InvalidDestination(PathBuf),

    #[error("{0} entries could not be resolved")]
    Incomplete(usize),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

/// helper to wrap zip errors with archive path context
pub trait ZipResultExt<T> {
    fn with_archive(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ZipResultExt<T> for zip::result::ZipResult<T> {
    fn with_archive(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Zip {
            path: path.into(),
            source,
        })
    }
}

impl Error {
    /// wrap an error as the failure of writing a specific destination
    pub fn writing(path: impl Into<PathBuf>, source: Error) -> Self {
        Error::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }
}
