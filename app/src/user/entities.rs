use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Login email, stored trimmed and lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(pub String);

impl Email {
    pub fn normalized(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub Uuid);

#[derive(Debug)]
pub struct User {
    pub id: Id,
    pub email: Email,
    /// Staff review top-ups and settle orders for every customer.
    pub is_staff: bool,
    pub created: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(
            Email::normalized("  Ada@Example.COM "),
            Email("ada@example.com".to_owned())
        );
    }
}
