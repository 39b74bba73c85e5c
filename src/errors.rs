use std::fmt::Display;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SGError
{
    /// Refinement was requested on a grid without points.
    EmptyStorage,
    DimensionMismatch,
    InvalidLevelLimits,
    InvalidIndex,
    LZ4DecompressionFailed,
    ReadBufferFailed,
    WriteBufferFailed,
    SerializationFailed,
    DeserializationFailed,
    UnsupportedVersion,
    FileIOError,
}
impl std::error::Error for SGError {}

impl Display for SGError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", *self)
    }
}
