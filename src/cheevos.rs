use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::{API_KEY_VAR, Credential};
use crate::error::OrganizeError;

pub const DEFAULT_API_BASE: &str = "https://retroachievements.org";
const GAME_LIST_PATH: &str = "/API/API_GetGameList.php";

#[derive(Debug, Deserialize)]
struct GameListEntry {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "ID")]
    id: u64,
    #[serde(rename = "NumAchievements", default)]
    num_achievements: u32,
    #[serde(rename = "Hashes", default)]
    hashes: Vec<String>,
}

/// MD5 hashes of every title on one console that has an achievement set.
#[derive(Debug, Clone, Default)]
pub struct AchievementIndex {
    console_id: u32,
    titles: HashMap<String, String>,
}

impl AchievementIndex {
    pub fn from_hashes<I, S, T>(console_id: u32, hashes: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: Into<String>,
    {
        let titles = hashes
            .into_iter()
            .map(|(md5, title)| (md5.as_ref().to_ascii_lowercase(), title.into()))
            .collect();
        Self { console_id, titles }
    }

    pub fn console_id(&self) -> u32 {
        self.console_id
    }

    pub fn has_achievements(&self, md5: &str) -> bool {
        self.titles.contains_key(&md5.to_ascii_lowercase())
    }

    pub fn title(&self, md5: &str) -> Option<&str> {
        self.titles
            .get(&md5.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

pub struct AchievementClient {
    client: Client,
    api_key: Credential,
    base_url: String,
    verbose: u8,
}

impl AchievementClient {
    pub fn new(api_key: Credential, timeout: Duration) -> Result<Self, OrganizeError> {
        // A modest timeout keeps a dead endpoint from hanging the run.
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrganizeError::config(format!("building HTTP client: {e}")))?;
        Ok(Self::with_client(client, api_key))
    }

    /// Same as `new` but accepts a prepared client for test injection.
    pub fn with_client(client: Client, api_key: Credential) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_API_BASE.to_string(),
            verbose: 0,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Fetch the hashes of all titles with achievements for `console_id`.
    /// One request, no retries.
    pub fn fetch_index(&self, console_id: u32) -> Result<AchievementIndex, OrganizeError> {
        let lookup_err = |reason: String| OrganizeError::Lookup { console_id, reason };

        let url = format!("{}{}", self.base_url, GAME_LIST_PATH);
        let console = console_id.to_string();
        vprintln!(
            self.verbose,
            2,
            "cheevos: GET {}?y=***&i={}&f=1&h=1",
            url,
            console
        );

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("y", self.api_key.expose()),
                ("i", console.as_str()),
                ("f", "1"),
                ("h", "1"),
            ])
            .send()
            // The request URL carries the key, so it never reaches a message.
            .map_err(|e| lookup_err(format!("request failed: {}", e.without_url())))?;

        let status = resp.status();
        vprintln!(self.verbose, 2, "cheevos: status={}", status);
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(lookup_err(format!(
                    "authentication rejected (HTTP {}); check {API_KEY_VAR}",
                    status.as_u16()
                )));
            }
            _ => return Err(lookup_err(format!("unexpected HTTP status {status}"))),
        }

        let games: Vec<GameListEntry> = resp
            .json()
            .map_err(|e| lookup_err(format!("unexpected response body: {}", e.without_url())))?;

        let total = games.len();
        let mut pairs = Vec::new();
        for game in games.into_iter().filter(|g| g.num_achievements > 0) {
            vprintln!(
                self.verbose,
                3,
                "cheevos: #{} {} ({} achievements, {} hashes)",
                game.id,
                game.title,
                game.num_achievements,
                game.hashes.len()
            );
            for hash in game.hashes {
                pairs.push((hash, game.title.clone()));
            }
        }

        let index = AchievementIndex::from_hashes(console_id, pairs);
        vprintln!(
            self.verbose,
            1,
            "cheevos: console {} lists {} titles, {} hashes with achievements",
            console_id,
            total,
            index.len()
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lookups_ignore_case() {
        let index = AchievementIndex::from_hashes(
            3,
            [("D41D8CD98F00B204E9800998ECF8427E", "Game A")],
        );
        assert_eq!(index.console_id(), 3);
        assert!(index.has_achievements("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(index.title("d41d8cd98f00b204e9800998ecf8427e"), Some("Game A"));
        assert!(!index.has_achievements("900150983cd24fb0d6963f7d28e17f72"));
    }

    #[test]
    fn game_list_entry_tolerates_missing_hashes() {
        let games: Vec<GameListEntry> = serde_json::from_str(
            r#"[{"Title":"Game A","ID":1,"ConsoleID":3,"NumAchievements":12},
                {"Title":"Game B","ID":2,"ConsoleID":3,"NumAchievements":0,"Hashes":["abc"]}]"#,
        )
        .unwrap();
        assert!(games[0].hashes.is_empty());
        assert_eq!(games[1].num_achievements, 0);
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = AchievementClient::with_client(Client::new(), Credential::new("k"))
            .with_base_url("http://localhost:1234/");
        assert_eq!(client.base_url, "http://localhost:1234");
    }
}
