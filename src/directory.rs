/// Redundant suffixes dropped from directory keys before matching.
const ALIAS_SUFFIXES: [&str; 2] = ["client", "proxy"];

/// Stripped aliases shorter than this fall back to the full key.
const MIN_ALIAS_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub key: String,
    alias: String,
    pub channels: Vec<String>,
}

/// Static lookup from client/proxy name to the channels that host it.
#[derive(Debug, Clone, Default)]
pub struct ClientChannelDirectory {
    entries: Vec<DirectoryEntry>,
}

impl ClientChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn smh_defaults() -> Self {
        Self::new()
            .with_entry("saberproxy", ["<#1458751684032331787>"])
            .with_entry("metroproxy", ["<#1458751743205707779>"])
            .with_entry("luminaclient", ["<#1458766462713073696>"])
            .with_entry("lumineproxy", ["<#1458766504765165610>"])
            .with_entry("wclient", ["<#1458766648608555029>"])
            .with_entry("lunarproxy", ["<#1458769266001182721>"])
            .with_entry("horionclient", ["<#1458777115582533819>"])
            .with_entry("vortexclient", ["<#1458777244913897595>"])
            .with_entry("boostclient", ["<#1459180134895583333>"])
    }

    pub fn with_entry<I, S>(mut self, key: &str, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.to_lowercase();
        self.entries.push(DirectoryEntry {
            alias: alias_for(&key),
            key,
            channels: channels.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Entries whose alias appears in `text`, in directory order.
    pub fn lookup(&self, text: &str) -> Vec<&DirectoryEntry> {
        let text = text.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| text.contains(&entry.alias))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }
}

fn alias_for(key: &str) -> String {
    for suffix in ALIAS_SUFFIXES {
        if let Some(stripped) = key.strip_suffix(suffix) {
            if stripped.len() >= MIN_ALIAS_LEN {
                return stripped.to_string();
            }
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(entries: Vec<&DirectoryEntry>) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn matches_stripped_alias() {
        let directory = ClientChannelDirectory::smh_defaults();
        assert_eq!(keys(directory.lookup("where do i get saber")), vec!["saberproxy"]);
        assert_eq!(keys(directory.lookup("SaberProxy download")), vec!["saberproxy"]);
    }

    #[test]
    fn short_alias_keeps_full_key() {
        let directory = ClientChannelDirectory::smh_defaults();
        assert!(directory.lookup("what is new").is_empty());
        assert_eq!(keys(directory.lookup("wclient link pls")), vec!["wclient"]);
    }

    #[test]
    fn distinguishes_lumina_from_lumine() {
        let directory = ClientChannelDirectory::smh_defaults();
        assert_eq!(keys(directory.lookup("lumina")), vec!["luminaclient"]);
        assert_eq!(keys(directory.lookup("lumine")), vec!["lumineproxy"]);
    }

    #[test]
    fn lists_keys_in_directory_order() {
        let directory = ClientChannelDirectory::smh_defaults();
        let all: Vec<&str> = directory.keys().collect();
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], "saberproxy");
        assert_eq!(all[8], "boostclient");
    }

    #[test]
    fn returns_every_match() {
        let directory = ClientChannelDirectory::smh_defaults();
        assert_eq!(
            keys(directory.lookup("saber or lunar?")),
            vec!["saberproxy", "lunarproxy"]
        );
    }
}
