use std::fmt;

/// Result of handing a scheduled application update to the relaunch helper.
///
/// The numeric codes travel through the `update_status <code>` startup argument
/// and the helper's result marker, so they are part of the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallUpdateStatus {
    Success = 0,
    UpdateLaunchError = 1,
    PackageMissing = 2,
    ExtractFilesError = 3,
    ApplyFilesError = 4,
    VerifyError = 5,
    UnknownError = 6,
}

impl InstallUpdateStatus {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Success,
            1 => Self::UpdateLaunchError,
            2 => Self::PackageMissing,
            3 => Self::ExtractFilesError,
            4 => Self::ApplyFilesError,
            5 => Self::VerifyError,
            6 => Self::UnknownError,
            _ => return None,
        })
    }

    /// Argument form of [`Success`](Self::Success), as the helper passes it.
    pub fn success_arg() -> String {
        Self::Success.code().to_string()
    }
}

impl fmt::Display for InstallUpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::UpdateLaunchError => "the update helper could not be started",
            Self::PackageMissing => "the downloaded update package is missing",
            Self::ExtractFilesError => "the update package could not be extracted",
            Self::ApplyFilesError => "the update files could not be copied",
            Self::VerifyError => "the update package signature is invalid",
            Self::UnknownError => "an unexpected error occurred",
        };
        f.write_str(text)
    }
}
