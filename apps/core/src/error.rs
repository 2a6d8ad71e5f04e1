use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconErrorKind {
    PermissionDenied,
    InvalidArgument,
    AccessDenied,
    PathTooLong,
    NotSupported,
    NotFound,
    Unexpected,
}

impl IconErrorKind {
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::Unexpected)
    }

    fn label(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission denied",
            Self::InvalidArgument => "invalid argument",
            Self::AccessDenied => "access denied",
            Self::PathTooLong => "path too long",
            Self::NotSupported => "not supported",
            Self::NotFound => "not found",
            Self::Unexpected => "unexpected failure",
        }
    }
}

/// A failure raised by one of the shell collaborators, classified where
/// the collaborator was called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconError {
    pub kind: IconErrorKind,
    pub path: PathBuf,
    pub detail: String,
}

impl IconError {
    pub fn new(kind: IconErrorKind, path: &Path, detail: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }

    pub fn unexpected(path: &Path, detail: impl Into<String>) -> Self {
        Self::new(IconErrorKind::Unexpected, path, detail)
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    pub fn from_io(path: &Path, error: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        if let Some(kind) = raw_os_kind(error) {
            return Self::new(kind, path, error.to_string());
        }

        let kind = match error.kind() {
            ErrorKind::PermissionDenied => IconErrorKind::AccessDenied,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => IconErrorKind::InvalidArgument,
            ErrorKind::Unsupported => IconErrorKind::NotSupported,
            ErrorKind::NotFound => IconErrorKind::NotFound,
            _ => IconErrorKind::Unexpected,
        };
        Self::new(kind, path, error.to_string())
    }

    /// Classifies a Win32 error code (`GetLastError`).
    pub fn from_os_code(path: &Path, code: u32) -> Self {
        let kind = match code {
            2 | 3 | 15 | 53 | 67 => IconErrorKind::NotFound,
            5 => IconErrorKind::AccessDenied,
            50 | 120 => IconErrorKind::NotSupported,
            87 | 123 | 161 => IconErrorKind::InvalidArgument,
            206 => IconErrorKind::PathTooLong,
            1314 => IconErrorKind::PermissionDenied,
            _ => IconErrorKind::Unexpected,
        };
        Self::new(kind, path, format!("os error {code}"))
    }

    /// Classifies a COM `HRESULT`. Facility-win32 codes are unwrapped first.
    pub fn from_hresult(path: &Path, hresult: i32) -> Self {
        const FACILITY_WIN32: u32 = 7;
        const E_NOTIMPL: u32 = 0x8000_4001;
        const E_NOINTERFACE: u32 = 0x8000_4002;
        const E_ACCESSDENIED: u32 = 0x8007_0005;
        const E_INVALIDARG: u32 = 0x8007_0057;

        let bits = hresult as u32;
        let kind = match bits {
            E_NOTIMPL | E_NOINTERFACE => IconErrorKind::NotSupported,
            E_ACCESSDENIED => IconErrorKind::AccessDenied,
            E_INVALIDARG => IconErrorKind::InvalidArgument,
            _ if hresult < 0 && (bits >> 16) & 0x1FFF == FACILITY_WIN32 => {
                Self::from_os_code(path, bits & 0xFFFF).kind
            }
            _ => IconErrorKind::Unexpected,
        };
        Self::new(kind, path, format!("hresult 0x{bits:08X}"))
    }
}

/// Win32 codes carried by an io error, when they say more than its kind.
#[cfg(target_os = "windows")]
fn raw_os_kind(error: &std::io::Error) -> Option<IconErrorKind> {
    let code = error.raw_os_error()?;
    let kind = IconError::from_os_code(Path::new(""), code as u32).kind;
    (kind != IconErrorKind::Unexpected).then_some(kind)
}

#[cfg(unix)]
fn raw_os_kind(error: &std::io::Error) -> Option<IconErrorKind> {
    const EPERM: i32 = 1;
    const EACCES: i32 = 13;
    const ENOTDIR: i32 = 20;
    #[cfg(any(target_os = "linux", target_os = "android"))]
    const ENAMETOOLONG: i32 = 36;
    #[cfg(any(target_os = "linux", target_os = "android"))]
    const ELOOP: i32 = 40;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const ELOOP: i32 = 62;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const ENAMETOOLONG: i32 = 63;

    let kind = match error.raw_os_error()? {
        EPERM => IconErrorKind::PermissionDenied,
        EACCES => IconErrorKind::AccessDenied,
        // A path component is a file, or the links go round in circles.
        ENOTDIR | ELOOP => IconErrorKind::NotFound,
        ENAMETOOLONG => IconErrorKind::PathTooLong,
        _ => return None,
    };
    Some(kind)
}

#[cfg(not(any(target_os = "windows", unix)))]
fn raw_os_kind(_error: &std::io::Error) -> Option<IconErrorKind> {
    None
}

impl Display for IconError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} for '{}': {}",
            self.kind.label(),
            self.path.display(),
            self.detail
        )
    }
}

impl std::error::Error for IconError {}
