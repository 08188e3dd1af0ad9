use std::fmt;
use std::str::FromStr;

/// A capability grant attached to an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Inference,
    Embedding,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Inference, Scope::Embedding];

    /// Wire name as stored on keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Inference => "models:inference",
            Scope::Embedding => "models:embedding",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    /// Accepts the wire name or the bare capability (`inference`, `embedding`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "models:inference" | "inference" => Ok(Scope::Inference),
            "models:embedding" | "embedding" => Ok(Scope::Embedding),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        assert_eq!("models:inference".parse::<Scope>(), Ok(Scope::Inference));
        assert_eq!(" embedding ".parse::<Scope>(), Ok(Scope::Embedding));
        assert!("models:admin".parse::<Scope>().is_err());
    }
}
