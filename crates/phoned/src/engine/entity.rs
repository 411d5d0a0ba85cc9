/// Entity abstraction for phoned
///
/// Base trait that all entities implement.
pub trait Entity: Send + Sync {
    /// Entity ID (e.g. "phone.hallway")
    fn entity_id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;
}
