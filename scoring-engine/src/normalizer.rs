use chrono::{DateTime, TimeZone, Utc};
use engageboard_core::{CoreError, NormalizedPost};
use serde_json::Value;
use tracing::{debug, warn};

/// One logical field and the upstream names it has been seen under, in
/// preference order. Candidates are dot-separated paths into the record.
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor {
    pub field: &'static str,
    pub candidates: &'static [&'static str],
}

impl FieldExtractor {
    pub const fn new(field: &'static str, candidates: &'static [&'static str]) -> Self {
        Self { field, candidates }
    }

    /// First candidate that is present and not null.
    pub fn probe<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.candidates
            .iter()
            .filter_map(|path| lookup_path(record, path))
            .find(|value| !value.is_null())
    }

    pub fn probe_string(&self, record: &Value) -> Option<String> {
        self.probe(record).and_then(value_to_string)
    }

    pub fn probe_count(&self, record: &Value) -> u64 {
        self.probe(record).map(value_to_count).unwrap_or(0)
    }
}

/// The full extractor table. Supporting a new upstream variant means adding a
/// candidate here.
#[derive(Debug, Clone)]
pub struct FieldTable {
    pub author_record: FieldExtractor,
    pub author_id: FieldExtractor,
    pub author_handle: FieldExtractor,
    pub author_display_name: FieldExtractor,
    pub author_avatar_url: FieldExtractor,
    pub post_id: FieldExtractor,
    pub text: FieldExtractor,
    pub created_at: FieldExtractor,
    pub like_count: FieldExtractor,
    pub retweet_count: FieldExtractor,
    pub reply_count: FieldExtractor,
}

impl Default for FieldTable {
    fn default() -> Self {
        Self {
            author_record: FieldExtractor::new(
                "author",
                &["author", "user", "tweetBy", "core.user_results.result"],
            ),
            author_id: FieldExtractor::new("authorId", &["id", "id_str", "rest_id", "userId"]),
            author_handle: FieldExtractor::new(
                "authorHandle",
                &[
                    "userName",
                    "username",
                    "screen_name",
                    "handle",
                    "legacy.screen_name",
                ],
            ),
            author_display_name: FieldExtractor::new(
                "authorDisplayName",
                &["name", "displayName", "display_name", "legacy.name"],
            ),
            author_avatar_url: FieldExtractor::new(
                "authorAvatarUrl",
                &[
                    "profilePicture",
                    "profile_image_url_https",
                    "profile_image_url",
                    "avatarUrl",
                    "avatar",
                    "legacy.profile_image_url_https",
                ],
            ),
            post_id: FieldExtractor::new("postId", &["id", "id_str", "rest_id", "tweetId"]),
            text: FieldExtractor::new(
                "text",
                &["full_text", "fullText", "text", "legacy.full_text"],
            ),
            created_at: FieldExtractor::new(
                "createdAt",
                &["createdAt", "created_at", "legacy.created_at"],
            ),
            like_count: FieldExtractor::new(
                "likeCount",
                &[
                    "likeCount",
                    "favorite_count",
                    "favoriteCount",
                    "likes",
                    "legacy.favorite_count",
                ],
            ),
            retweet_count: FieldExtractor::new(
                "retweetCount",
                &[
                    "retweetCount",
                    "retweet_count",
                    "retweets",
                    "legacy.retweet_count",
                ],
            ),
            reply_count: FieldExtractor::new(
                "replyCount",
                &["replyCount", "reply_count", "replies", "legacy.reply_count"],
            ),
        }
    }
}

/// Filename suffixes marking a downscaled avatar.
pub const SMALL_AVATAR_TOKENS: &[&str] = &["_normal", "_bigger", "_mini"];

#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub posts: Vec<NormalizedPost>,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    fields: FieldTable,
    small_avatar_tokens: &'static [&'static str],
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(FieldTable::default())
    }
}

impl Normalizer {
    pub fn new(fields: FieldTable) -> Self {
        Self {
            fields,
            small_avatar_tokens: SMALL_AVATAR_TOKENS,
        }
    }

    pub fn normalize(&self, record: &Value) -> Result<NormalizedPost, CoreError> {
        let fields = &self.fields;
        let author = fields
            .author_record
            .probe(record)
            .ok_or_else(|| CoreError::malformed("post has no author record"))?;
        if !author.is_object() {
            return Err(CoreError::malformed("author record is not an object"));
        }

        let handle = fields
            .author_handle
            .probe_string(author)
            .and_then(|raw| canonical_handle(&raw))
            .ok_or_else(|| CoreError::malformed("author record has no handle"))?;

        let text = fields.text.probe_string(record).unwrap_or_default();
        let created_at_raw = fields.created_at.probe_string(record);
        let created_at = created_at_raw.as_deref().and_then(parse_timestamp);
        let post_id = fields.post_id.probe_string(record).unwrap_or_else(|| {
            synthetic_post_id(&handle, created_at_raw.as_deref().unwrap_or_default(), &text)
        });

        Ok(NormalizedPost {
            post_id,
            author_id: fields.author_id.probe_string(author),
            display_name: fields
                .author_display_name
                .probe_string(author)
                .filter(|name| !name.trim().is_empty()),
            avatar_url: fields
                .author_avatar_url
                .probe_string(author)
                .map(|url| upgrade_avatar_url(&url, self.small_avatar_tokens)),
            handle,
            text,
            created_at,
            created_at_raw,
            like_count: fields.like_count.probe_count(record),
            retweet_count: fields.retweet_count.probe_count(record),
            reply_count: fields.reply_count.probe_count(record),
        })
    }

    /// Normalizes every record it can; malformed ones are counted and dropped.
    pub fn normalize_batch(&self, records: &[Value]) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            posts: Vec::with_capacity(records.len()),
            skipped: 0,
        };

        for (index, record) in records.iter().enumerate() {
            match self.normalize(record) {
                Ok(post) => batch.posts.push(post),
                Err(error) => {
                    debug!(index, %error, "Skipping raw post");
                    batch.skipped += 1;
                }
            }
        }

        if batch.skipped > 0 {
            warn!(
                skipped = batch.skipped,
                total = records.len(),
                "Skipped malformed posts in batch"
            );
        }
        batch
    }
}

fn lookup_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |current, segment| current.get(segment))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().replace(',', "").parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

/// Trims, strips any leading `@`, and puts exactly one back.
pub fn canonical_handle(raw: &str) -> Option<String> {
    let bare = raw.trim().trim_start_matches('@');
    if bare.is_empty() {
        None
    } else {
        Some(format!("@{}", bare))
    }
}

/// Drops a small-size token from the avatar filename, keeping extension and
/// query string: `abc_normal.jpg` becomes `abc.jpg`.
pub fn upgrade_avatar_url(url: &str, tokens: &[&str]) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let (dir, file) = match base.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, base),
    };
    let (stem, extension) = match file.rsplit_once('.') {
        Some((stem, extension)) => (stem, Some(extension)),
        None => (file, None),
    };

    let Some(stripped) = tokens.iter().find_map(|token| stem.strip_suffix(token)) else {
        return url.to_string();
    };

    let mut upgraded = String::with_capacity(url.len());
    if let Some(dir) = dir {
        upgraded.push_str(dir);
        upgraded.push('/');
    }
    upgraded.push_str(stripped);
    if let Some(extension) = extension {
        upgraded.push('.');
        upgraded.push_str(extension);
    }
    if let Some(query) = query {
        upgraded.push('?');
        upgraded.push_str(query);
    }
    upgraded
}

/// Accepts RFC 3339, the legacy `Wed Oct 10 20:19:24 +0000 2018` form, and
/// epoch seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y") {
        return Some(parsed.with_timezone(&Utc));
    }
    let epoch = raw.parse::<i64>().ok()?;
    if epoch > 100_000_000_000 {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}

fn synthetic_post_id(handle: &str, created_at: &str, text: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in created_at.bytes().chain([0x1f]).chain(text.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{}-{:016x}", handle.trim_start_matches('@'), hash)
}
