use std::collections::BTreeMap;

const CANONICAL_COMMANDS: &[&str] = &[
    "apt", "pkg", "pip", "python", "python2", "python3", "git", "bash", "nmap", "sqlmap",
    "hydra", "openvpn", "update", "upgrade", "install", "clone", "clear",
];

const COMMON_TYPOS: &[(&str, &str)] = &[
    ("updata", "update"),
    ("upgarde", "upgrade"),
    ("instal", "install"),
    ("insatll", "install"),
    ("pyhton", "python"),
    ("clne", "clone"),
    ("clera", "clear"),
    ("nmpa", "nmap"),
    ("sqlamp", "sqlmap"),
    ("hyrda", "hydra"),
    ("gti", "git"),
];

/// Typo corrections and canonical command names. Every correction target is
/// also canonical, so correcting twice changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    typos: BTreeMap<String, String>,
    canonical: BTreeMap<String, String>,
}

impl Vocabulary {
    pub fn new(typos: BTreeMap<String, String>, canonical: BTreeMap<String, String>) -> Self {
        Self { typos, canonical }
    }

    pub fn builtin() -> Self {
        let typos = COMMON_TYPOS
            .iter()
            .map(|(typo, fixed)| (typo.to_string(), fixed.to_string()))
            .collect();
        let canonical = CANONICAL_COMMANDS
            .iter()
            .map(|name| (name.to_string(), name.to_string()))
            .collect();
        Self::new(typos, canonical)
    }

    pub fn typo(&self, token: &str) -> Option<&str> {
        self.typos.get(token).map(String::as_str)
    }

    pub fn canonical(&self, token: &str) -> Option<&str> {
        self.canonical.get(token).map(String::as_str)
    }

    /// Typo table first, canonical table second.
    pub fn lookup(&self, token: &str) -> Option<&str> {
        self.typo(token).or_else(|| self.canonical(token))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.canonical
            .keys()
            .chain(self.typos.keys())
            .map(String::as_str)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}
