//! Game-link recognition and parameter extraction.
//!
//! A prefetchable link is any anchor href containing `/game?page=`. Its query
//! carries the game state (page, remaining clicks, target, difficulty, start
//! time), which the controller mirrors onto the lightweight `/game_data`
//! endpoint.

use thiserror::Error;
use url::{form_urlencoded, Url};

/// Marker identifying an in-game navigation link.
pub const GAME_LINK_MARKER: &str = "/game?page=";

/// Base used to resolve relative hrefs; never dereferenced.
const DUMMY_BASE: &str = "http://sixhop.invalid/";

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("not a game link: {0}")]
    NotGameLink(String),

    #[error("href missing page parameter: {0}")]
    MissingPage(String),

    #[error("unparseable href {href}: {reason}")]
    Unparseable { href: String, reason: String },
}

/// Whether an href points at a game page worth prefetching.
pub fn is_game_link(href: &str) -> bool {
    href.contains(GAME_LINK_MARKER)
}

/// Game state carried in a game-page link's query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameParams {
    pub page: String,
    pub clicks: Option<String>,
    pub mytarget: Option<String>,
    pub difficulty: Option<String>,
    pub start_time: Option<String>,
}

impl GameParams {
    /// Extract game parameters from a game-page href. Relative hrefs are
    /// resolved against a placeholder base.
    pub fn from_href(href: &str) -> Result<Self, LinkError> {
        if !is_game_link(href) {
            return Err(LinkError::NotGameLink(href.to_string()));
        }

        let base = Url::parse(DUMMY_BASE).expect("static base URL");
        let url = Url::options()
            .base_url(Some(&base))
            .parse(href)
            .map_err(|e| LinkError::Unparseable {
                href: href.to_string(),
                reason: e.to_string(),
            })?;

        let mut page = None;
        let mut clicks = None;
        let mut mytarget = None;
        let mut difficulty = None;
        let mut start_time = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "page" => page = Some(value.into_owned()),
                "clicks" => clicks = Some(value.into_owned()),
                "mytarget" => mytarget = Some(value.into_owned()),
                "difficulty" => difficulty = Some(value.into_owned()),
                "start_time" => start_time = Some(value.into_owned()),
                _ => {}
            }
        }

        let page = page.ok_or_else(|| LinkError::MissingPage(href.to_string()))?;

        Ok(Self {
            page,
            clicks,
            mytarget,
            difficulty,
            start_time,
        })
    }

    /// Percent-encoded query string for the game-data endpoint.
    pub fn data_query(&self) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());
        ser.append_pair("page", &self.page);
        if let Some(clicks) = &self.clicks {
            ser.append_pair("clicks", clicks);
        }
        if let Some(target) = &self.mytarget {
            ser.append_pair("mytarget", target);
        }
        if let Some(difficulty) = &self.difficulty {
            ser.append_pair("difficulty", difficulty);
        }
        if let Some(start_time) = &self.start_time {
            ser.append_pair("start_time", start_time);
        }
        ser.finish()
    }

    /// Full game-data request URL for a given endpoint path.
    pub fn data_url(&self, endpoint: &str) -> String {
        format!("{endpoint}?{}", self.data_query())
    }
}
