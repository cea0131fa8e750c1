/// Errors returned to callers of engine commands.
///
/// A rejected command leaves the simulation state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The direction argument did not name one of the four approaches.
    #[error("invalid direction '{0}' (expected north, south, east or west)")]
    InvalidDirection(String),

    /// More vehicles were requested in one command than the engine allows.
    #[error("cannot add {requested} vehicles in one command (limit {limit})")]
    InvalidCount { requested: usize, limit: usize },
}
