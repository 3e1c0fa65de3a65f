pub mod engine;
pub mod helper;
pub mod refresher;
pub mod scope;
pub mod suggestion;

pub use engine::{KeywordCasing, SqlCompleter, SqlCompletion};
pub use helper::SqliteHelper;
pub use refresher::{CompleterOptions, CompletionRefresher, RefreshCallback};
