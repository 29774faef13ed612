pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, error, header, info, muted, section, success, summary_row, timing, tone, warn};
pub use progress::Spinner;
pub use table::{TableBuilder, render};
pub use theme::{Theme, theme};
