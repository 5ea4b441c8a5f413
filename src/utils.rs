//! # Utility Functions Module
//!
//! Small helpers shared by the engine registry and the optimizer: building
//! tool argument vectors and rendering paths for log lines.

use std::path::Path;

/// Converts any iterable of string-like items to `Vec<String>`.
///
/// Tool command lines mix literals, numbers and paths; this avoids a
/// `.to_string()` on every element.
///
/// # Example
/// ```rust
/// use imgcompress::utils::to_string_vec;
///
/// let quality = 85;
/// let args = to_string_vec(["-quality", &quality.to_string(), "-optimize"]);
/// assert_eq!(args[1], "85");
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Macro for building argument vectors from heterogeneous items.
///
/// # Example
/// ```rust
/// use imgcompress::args;
///
/// let quality = 85;
/// let args = args!["-quality", quality, "-optimize"];
/// assert_eq!(args, vec!["-quality", "85", "-optimize"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        ::std::vec![$(::std::string::ToString::to_string(&$item)),*]
    };
}

/// Lossy string form of a path, for tool arguments
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// File name of a path for user-facing messages (falls back to the full path)
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Renders a command line for debug logging
pub fn display_command(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        if arg.contains(' ') {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}
