use std::fmt;

/// Kind of the Instagram page the link points to. It determines the path
/// prefix of the canonical URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub(crate) enum ContentKind {
    #[strum(serialize = "p")]
    Post,

    #[strum(serialize = "reel")]
    Reel,

    #[strum(serialize = "tv")]
    Tv,
}

/// Identifier of a post, reel or IGTV video
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ContentId {
    pub(crate) kind: ContentKind,
    pub(crate) id: String,
}

impl ContentId {
    pub(crate) fn canonical_url(&self) -> String {
        let path: &'static str = self.kind.into();
        format!("https://www.instagram.com/{path}/{}/", self.id)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Extracts the content id from the message text. The text must be the link
/// itself, anything that follows the id (trailing slash, query string,
/// fragment) is ignored.
pub(crate) fn classify(text: &str) -> Option<ContentId> {
    let text = text.trim();

    let (_, kind, id) = lazy_regex::regex_captures!(
        r"^(?:https?://)?(?:www\.)?instagram\.com/(p|reel|tv)/([A-Za-z0-9_-]+)",
        text
    )?;

    let kind = match kind {
        "p" => ContentKind::Post,
        "reel" => ContentKind::Reel,
        "tv" => ContentKind::Tv,
        _ => return None,
    };

    Some(ContentId {
        kind,
        id: id.to_owned(),
    })
}
