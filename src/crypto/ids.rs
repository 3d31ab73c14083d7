use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use uuid::Uuid;

/// Shape of a generated identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdKind {
    /// 10 alphanumeric characters, shareable short codes.
    Short,
    /// 48 alphanumeric characters, internal primary keys.
    Long,
    /// Hyphenated UUIDv7.
    UuidV7,
    /// UUIDv7 without hyphens.
    #[default]
    UuidV7NoDashes,
}

const SHORT_LEN: usize = 10;
const LONG_LEN: usize = 48;

fn alphanumeric(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Whether `value` has the shape of an `IdKind::Long` key.
pub fn is_long_id(value: &str) -> bool {
    value.len() == LONG_LEN && value.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Generates a fresh identifier of the requested kind.
pub fn generate_id(kind: IdKind) -> String {
    match kind {
        IdKind::Short => alphanumeric(SHORT_LEN),
        IdKind::Long => alphanumeric(LONG_LEN),
        IdKind::UuidV7 => Uuid::now_v7().to_string(),
        IdKind::UuidV7NoDashes => Uuid::now_v7().simple().to_string(),
    }
}
