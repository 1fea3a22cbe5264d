use serde::{Deserialize, Serialize};

use crate::index::{ProgressLookup, RemoteCatalogIndex};
use crate::model::{LocalRecord, RemoteItem};

/// A remote item offered for one local record
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub item: &'a RemoteItem,
    /// 0 to 2: title match plus author match
    pub score: u8,
    /// The user has a progress record for this item
    pub in_progress: bool,
}

impl Candidate<'_> {
    /// Owned copy of what a picker needs to show
    pub fn summary(&self) -> CandidateSummary {
        CandidateSummary {
            remote_id: self.item.id().to_string(),
            title: self.item.title().to_string(),
            author: self.item.author_name().to_string(),
            score: self.score,
            in_progress: self.in_progress,
            url: None,
        }
    }
}

/// Detached candidate, outliving the fetched catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSummary {
    pub remote_id: String,
    pub title: String,
    pub author: String,
    pub score: u8,
    pub in_progress: bool,
    /// Web page of the item on the remote server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CandidateSummary {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// The human's answer for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "remote_id")]
pub enum MatchSelection {
    /// Link to the given remote item id
    Link(String),
    /// Explicitly no match
    Skip,
    /// The picker was dismissed without an answer
    Cancelled,
}

/// Ranks every catalog item against a local record
///
/// Ordering is advisory. Nothing here picks on the caller's behalf.
#[derive(Debug, Clone, Copy)]
pub struct InteractiveMatcher<'a> {
    index: &'a RemoteCatalogIndex,
    progress: Option<&'a ProgressLookup>,
}

impl<'a> InteractiveMatcher<'a> {
    pub fn new(index: &'a RemoteCatalogIndex) -> Self {
        Self {
            index,
            progress: None,
        }
    }

    /// Flag candidates the user has started
    pub fn with_progress(mut self, progress: &'a ProgressLookup) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Best candidates first, ties by lowercased remote title
    pub fn rank(&self, record: &LocalRecord) -> Vec<Candidate<'a>> {
        let title = record.title.to_lowercase();
        let authors: Vec<String> = record.authors.iter().map(|a| a.to_lowercase()).collect();

        let mut ranked: Vec<(String, Candidate<'a>)> = self
            .index
            .items()
            .iter()
            .map(|item| {
                let remote_title = item.title().to_lowercase();
                let remote_author = item.author_name().to_lowercase();

                let mut score = 0;
                if remote_title == title {
                    score += 1;
                }
                if authors.contains(&remote_author) {
                    score += 1;
                }

                let in_progress = self.progress.is_some_and(|p| p.contains(item.id()));
                (remote_title, Candidate { item, score, in_progress })
            })
            .collect();

        ranked.sort_by(|(a_title, a), (b_title, b)| {
            b.score.cmp(&a.score).then_with(|| a_title.cmp(b_title))
        });

        ranked.into_iter().map(|(_, c)| c).collect()
    }
}
