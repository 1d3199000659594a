// =========================================================================
// Credentials (User/Group)
// =========================================================================

/// A system user the daemon switches to, by name or numeric uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum User {
    Name(String),
    Id(u32),
}

/// A system group the daemon switches to, by name or numeric gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    Name(String),
    Id(u32),
}

impl From<&str> for User {
    fn from(s: &str) -> Self {
        User::Name(s.to_owned())
    }
}

impl From<String> for User {
    fn from(s: String) -> Self {
        User::Name(s)
    }
}

impl From<u32> for User {
    fn from(id: u32) -> Self {
        User::Id(id)
    }
}

impl From<&str> for Group {
    fn from(s: &str) -> Self {
        Group::Name(s.to_owned())
    }
}

impl From<String> for Group {
    fn from(s: String) -> Self {
        Group::Name(s)
    }
}

impl From<u32> for Group {
    fn from(id: u32) -> Self {
        Group::Id(id)
    }
}
