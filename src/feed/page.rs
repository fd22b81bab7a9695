use serde::Deserialize;

/// One post from a listing page, as handed to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Upvotes (`ups`); negative values are clamped to zero on decode
    pub score: u64,
    /// Subreddit the post belongs to
    pub feed: String,
}

/// A decoded listing page: its items and the cursor for the next one.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Item>,
    /// `None` when this was the last page
    pub next_cursor: Option<String>,
}

/// Author shown for posts whose author is missing or null.
const DELETED_AUTHOR: &str = "[deleted]";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    after: Option<String>,
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    subreddit: String,
}

/// Decode a `/r/{feed}/new` listing body.
///
/// `feed` fills in [`Item::feed`] for posts that omit their subreddit.
/// An `after` that is missing, `null` or empty ends pagination.
pub fn parse_page(bytes: &[u8], feed: &str) -> Result<Page, serde_json::Error> {
    let listing: Listing = serde_json::from_slice(bytes)?;

    let items = listing
        .data
        .children
        .into_iter()
        .map(|child| {
            let post = child.data;
            Item {
                id: post.id,
                title: post.title,
                author: post.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
                score: post.ups.max(0) as u64,
                feed: if post.subreddit.is_empty() {
                    feed.to_string()
                } else {
                    post.subreddit
                },
            }
        })
        .collect();

    let next_cursor = listing.data.after.filter(|after| !after.is_empty());

    Ok(Page { items, next_cursor })
}
