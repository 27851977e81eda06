//! Shared links and URL resolution
//!
//! The link list for an album is replaced wholesale on every poll. Every
//! URL a consumer needs (album page, per-asset page, direct download, video
//! playback) is derived on demand by [`LinkResolver`] from whatever list the
//! coordinator currently holds; nothing here is cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::parse_timestamp;
use crate::payload::RawSharedLink;

/// One shareable link for an album
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLinkRecord {
    pub id: String,
    pub key: String,
    pub has_password: bool,
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub allow_download: bool,
    pub show_metadata: bool,
}

impl SharedLinkRecord {
    /// Build a record from an API entry; entries without a key are unusable
    pub fn from_raw(raw: &RawSharedLink) -> Option<Self> {
        let key = raw.key.as_deref().filter(|k| !k.is_empty())?;
        let password = raw.password.clone().filter(|p| !p.is_empty());

        Some(Self {
            id: raw.id.clone(),
            key: key.to_string(),
            has_password: password.is_some(),
            password,
            expires_at: raw.expires_at.as_deref().and_then(parse_timestamp),
            allow_download: raw.allow_download.unwrap_or(true),
            show_metadata: raw.show_metadata.unwrap_or(true),
        })
    }

    /// Expiry present and in the past
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }

    /// Not password-protected and not expired
    pub fn is_accessible_at(&self, now: DateTime<Utc>) -> bool {
        !self.has_password && !self.is_expired_at(now)
    }
}

/// Select the links that belong to `album_id`
pub fn links_for_album(raws: &[RawSharedLink], album_id: &str) -> Vec<SharedLinkRecord> {
    raws.iter()
        .filter(|raw| raw.album.as_ref().is_some_and(|album| album.id == album_id))
        .filter_map(SharedLinkRecord::from_raw)
        .collect()
}

/// Summary of one link for diagnostics and entity attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLinkInfo {
    pub id: String,
    pub url: String,
    pub has_password: bool,
    pub is_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_accessible: bool,
}

/// URL derivation over one album's links, evaluated at a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct LinkResolver<'a> {
    base_url: &'a str,
    links: &'a [SharedLinkRecord],
    now: DateTime<Utc>,
}

impl<'a> LinkResolver<'a> {
    pub fn new(base_url: &'a str, links: &'a [SharedLinkRecord], now: DateTime<Utc>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/'),
            links,
            now,
        }
    }

    /// Links usable without a password
    pub fn accessible(&self) -> impl Iterator<Item = &'a SharedLinkRecord> + '_ {
        self.links.iter().filter(move |l| l.is_accessible_at(self.now))
    }

    /// Password-protected links that have not expired
    pub fn protected_not_expired(&self) -> impl Iterator<Item = &'a SharedLinkRecord> + '_ {
        self.links
            .iter()
            .filter(move |l| l.has_password && !l.is_expired_at(self.now))
    }

    pub fn any_non_expired(&self) -> impl Iterator<Item = &'a SharedLinkRecord> + '_ {
        self.links.iter().filter(move |l| !l.is_expired_at(self.now))
    }

    /// First accessible link, else first non-expired link
    pub fn preferred(&self) -> Option<&'a SharedLinkRecord> {
        self.accessible()
            .next()
            .or_else(|| self.any_non_expired().next())
    }

    pub fn share_url(&self, link: &SharedLinkRecord) -> String {
        format!("{}/share/{}", self.base_url, link.key)
    }

    pub fn has_unprotected_link(&self) -> bool {
        self.accessible().next().is_some()
    }

    pub fn has_protected_link(&self) -> bool {
        self.protected_not_expired().next().is_some()
    }

    pub fn public_url(&self) -> Option<String> {
        self.accessible().next().map(|l| self.share_url(l))
    }

    pub fn public_urls(&self) -> Vec<String> {
        self.accessible().map(|l| self.share_url(l)).collect()
    }

    pub fn protected_url(&self) -> Option<String> {
        self.protected_not_expired().next().map(|l| self.share_url(l))
    }

    pub fn protected_urls(&self) -> Vec<String> {
        self.protected_not_expired()
            .map(|l| self.share_url(l))
            .collect()
    }

    /// Album URL preferring an accessible link
    pub fn any_url(&self) -> Option<String> {
        self.preferred().map(|l| self.share_url(l))
    }

    pub fn protected_password(&self) -> Option<String> {
        self.protected_not_expired()
            .next()
            .and_then(|l| l.password.clone())
    }

    pub fn protected_link_id(&self) -> Option<String> {
        self.protected_not_expired().next().map(|l| l.id.clone())
    }

    pub fn unprotected_link_id(&self) -> Option<String> {
        self.accessible().next().map(|l| l.id.clone())
    }

    /// Web viewer URL for one asset
    pub fn asset_public_url(&self, asset_id: &str) -> Option<String> {
        self.preferred()
            .map(|l| format!("{}/share/{}/photos/{}", self.base_url, l.key, asset_id))
    }

    /// Direct download URL for the original file
    pub fn asset_download_url(&self, asset_id: &str) -> Option<String> {
        self.preferred().map(|l| {
            format!(
                "{}/api/assets/{}/original?key={}",
                self.base_url, asset_id, l.key
            )
        })
    }

    /// Transcoded playback URL for a video
    pub fn asset_playback_url(&self, asset_id: &str) -> Option<String> {
        self.preferred().map(|l| {
            format!(
                "{}/api/assets/{}/video/playback?key={}",
                self.base_url, asset_id, l.key
            )
        })
    }

    /// Thumbnail endpoint; requires the API key, not a share key
    pub fn thumbnail_url(&self, asset_id: &str) -> String {
        format!("{}/api/assets/{}/thumbnail", self.base_url, asset_id)
    }

    pub fn links_info(&self) -> Vec<SharedLinkInfo> {
        self.links
            .iter()
            .map(|l| SharedLinkInfo {
                id: l.id.clone(),
                url: self.share_url(l),
                has_password: l.has_password,
                is_expired: l.is_expired_at(self.now),
                expires_at: l.expires_at,
                is_accessible: l.is_accessible_at(self.now),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::RawAlbumRef;
    use chrono::Duration;

    const BASE: &str = "https://photos.example.com/";

    fn link(id: &str, key: &str, password: Option<&str>, expires: Option<DateTime<Utc>>) -> SharedLinkRecord {
        SharedLinkRecord {
            id: id.to_string(),
            key: key.to_string(),
            has_password: password.is_some(),
            password: password.map(str::to_string),
            expires_at: expires,
            allow_download: true,
            show_metadata: true,
        }
    }

    #[test]
    fn test_from_raw_filters_and_normalizes() {
        let raws = vec![
            RawSharedLink {
                id: "l1".into(),
                key: Some("k1".into()),
                album: Some(RawAlbumRef { id: "album-1".into() }),
                password: Some(String::new()),
                expires_at: Some("2030-01-01T00:00:00.000Z".into()),
                ..Default::default()
            },
            RawSharedLink {
                id: "l2".into(),
                key: None,
                album: Some(RawAlbumRef { id: "album-1".into() }),
                ..Default::default()
            },
            RawSharedLink {
                id: "l3".into(),
                key: Some("k3".into()),
                album: Some(RawAlbumRef { id: "album-2".into() }),
                ..Default::default()
            },
            RawSharedLink {
                id: "l4".into(),
                key: Some("k4".into()),
                album: None,
                ..Default::default()
            },
        ];

        let links = links_for_album(&raws, "album-1");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, "l1");
        assert!(!links[0].has_password);
        assert!(links[0].expires_at.is_some());
        assert!(links[0].allow_download);
    }

    #[test]
    fn test_unparseable_expiry_never_expires() {
        let raw = RawSharedLink {
            id: "l1".into(),
            key: Some("k1".into()),
            expires_at: Some("soon".into()),
            ..Default::default()
        };
        let record = SharedLinkRecord::from_raw(&raw).unwrap();
        assert!(record.expires_at.is_none());
        assert!(!record.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_expiry_and_accessibility() {
        let now = Utc::now();
        let expired = link("l1", "k1", None, Some(now - Duration::seconds(1)));
        let future = link("l2", "k2", None, Some(now + Duration::hours(1)));
        let protected = link("l3", "k3", Some("secret"), None);

        assert!(expired.is_expired_at(now));
        assert!(!expired.is_accessible_at(now));
        assert!(future.is_accessible_at(now));
        assert!(!protected.is_accessible_at(now));
        assert!(!protected.is_expired_at(now));
    }

    #[test]
    fn test_urls_prefer_accessible_links() {
        let now = Utc::now();
        let links = vec![
            link("l1", "protected", Some("pw"), None),
            link("l2", "public", None, None),
        ];
        let resolver = LinkResolver::new(BASE, &links, now);

        assert_eq!(resolver.public_url().unwrap(), "https://photos.example.com/share/public");
        assert_eq!(resolver.any_url().unwrap(), "https://photos.example.com/share/public");
        assert_eq!(resolver.protected_url().unwrap(), "https://photos.example.com/share/protected");
        assert_eq!(resolver.protected_password().as_deref(), Some("pw"));
        assert_eq!(resolver.protected_link_id().as_deref(), Some("l1"));
        assert_eq!(resolver.unprotected_link_id().as_deref(), Some("l2"));
        assert!(resolver.has_protected_link());
        assert!(resolver.has_unprotected_link());
        assert_eq!(
            resolver.asset_public_url("a1").unwrap(),
            "https://photos.example.com/share/public/photos/a1"
        );
        assert_eq!(
            resolver.asset_download_url("a1").unwrap(),
            "https://photos.example.com/api/assets/a1/original?key=public"
        );
        assert_eq!(
            resolver.asset_playback_url("a1").unwrap(),
            "https://photos.example.com/api/assets/a1/video/playback?key=public"
        );
    }

    #[test]
    fn test_any_url_falls_back_to_protected() {
        let now = Utc::now();
        let links = vec![
            link("l1", "stale", None, Some(now - Duration::days(1))),
            link("l2", "guarded", Some("pw"), None),
        ];
        let resolver = LinkResolver::new(BASE, &links, now);

        assert!(resolver.public_url().is_none());
        assert!(resolver.public_urls().is_empty());
        assert_eq!(resolver.any_url().unwrap(), "https://photos.example.com/share/guarded");
        assert_eq!(
            resolver.asset_download_url("a1").unwrap(),
            "https://photos.example.com/api/assets/a1/original?key=guarded"
        );
    }

    #[test]
    fn test_no_usable_links() {
        let now = Utc::now();
        let links = vec![link("l1", "stale", Some("pw"), Some(now - Duration::days(1)))];
        let resolver = LinkResolver::new(BASE, &links, now);

        assert!(resolver.any_url().is_none());
        assert!(resolver.protected_url().is_none());
        assert!(resolver.asset_public_url("a1").is_none());
        assert!(!resolver.has_protected_link());

        let info = resolver.links_info();
        assert_eq!(info.len(), 1);
        assert!(info[0].is_expired);
        assert!(!info[0].is_accessible);
    }

    #[test]
    fn test_thumbnail_url_needs_no_link() {
        let resolver = LinkResolver::new(BASE, &[], Utc::now());
        assert_eq!(
            resolver.thumbnail_url("a1"),
            "https://photos.example.com/api/assets/a1/thumbnail"
        );
    }
}
