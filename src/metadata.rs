//! Tag propagation from a source file to its converted counterpart.

use std::collections::BTreeMap;
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::tag::{ItemValue, Tag};
use log::debug;

use crate::error::MetadataError;

/// Embedded picture, usually the front cover
#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

/// The tag fields carried from source to target.
///
/// Common fields are named; text items the tag library has no key for are
/// kept in `extra` under their native names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<u32>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub album_artist: Option<String>,
    pub disc_number: Option<u32>,
    pub comment: Option<String>,
    pub lyrics: Option<String>,
    pub artwork: Option<Artwork>,
    pub extra: BTreeMap<String, String>,
}

impl TrackMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// One-line "Title: …, Artist: …" summary
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            ("Title", self.title.clone()),
            ("Artist", self.artist.clone()),
            ("Album", self.album.clone()),
            ("Year", self.year.map(|y| y.to_string())),
            ("Genre", self.genre.clone()),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| format!("{label}: {v}")))
        .collect();
        if parts.is_empty() {
            "No metadata found".to_string()
        } else {
            parts.join(", ")
        }
    }

    fn from_tag(tag: &Tag) -> Self {
        let text = |key: &ItemKey| tag.get_string(key).map(str::to_string);
        let pictures = tag.pictures();
        let cover = pictures
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.first());

        Self {
            title: tag.title().map(|s| s.into_owned()),
            artist: tag.artist().map(|s| s.into_owned()),
            album: tag.album().map(|s| s.into_owned()),
            track: tag.track(),
            year: tag.year(),
            genre: tag.genre().map(|s| s.into_owned()),
            album_artist: text(&ItemKey::AlbumArtist),
            disc_number: tag.disk(),
            comment: tag.comment().map(|s| s.into_owned()),
            lyrics: text(&ItemKey::Lyrics),
            artwork: cover.map(|p| Artwork {
                data: p.data().to_vec(),
                mime_type: p.mime_type().map(|m| m.as_str().to_string()),
            }),
            extra: tag
                .items()
                .filter_map(|item| match (item.key(), item.value()) {
                    (ItemKey::Unknown(key), ItemValue::Text(value)) => {
                        Some((key.clone(), value.clone()))
                    }
                    _ => None,
                })
                .collect(),
        }
    }

    fn write_to_tag(&self, tag: &mut Tag, with_artwork: bool) {
        if let Some(v) = &self.title {
            tag.set_title(v.clone());
        }
        if let Some(v) = &self.artist {
            tag.set_artist(v.clone());
        }
        if let Some(v) = &self.album {
            tag.set_album(v.clone());
        }
        if let Some(v) = self.track {
            tag.set_track(v);
        }
        if let Some(v) = self.year {
            tag.set_year(v);
        }
        if let Some(v) = &self.genre {
            tag.set_genre(v.clone());
        }
        if let Some(v) = self.disc_number {
            tag.set_disk(v);
        }
        if let Some(v) = &self.comment {
            tag.set_comment(v.clone());
        }
        if let Some(v) = &self.album_artist {
            tag.insert_text(ItemKey::AlbumArtist, v.clone());
        }
        if let Some(v) = &self.lyrics {
            tag.insert_text(ItemKey::Lyrics, v.clone());
        }
        for (key, value) in &self.extra {
            tag.insert_text(ItemKey::Unknown(key.clone()), value.clone());
        }
        if let (true, Some(art)) = (with_artwork, &self.artwork) {
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(Picture::new_unchecked(
                PictureType::CoverFront,
                art.mime_type.as_deref().map(MimeType::from_str),
                None,
                art.data.clone(),
            ));
        }
    }
}

/// Reads and writes tags on audio files, keyed by container format.
pub trait MetadataStore: Send + Sync {
    fn extract(&self, path: &Path) -> Result<TrackMetadata, MetadataError>;
    fn apply(&self, path: &Path, metadata: &TrackMetadata) -> Result<(), MetadataError>;
}

/// `MetadataStore` backed by lofty
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyStore;

impl MetadataStore for LoftyStore {
    fn extract(&self, path: &Path) -> Result<TrackMetadata, MetadataError> {
        let tagged = lofty::read_from_path(path)?;
        Ok(tagged
            .primary_tag()
            .or_else(|| tagged.first_tag())
            .map(TrackMetadata::from_tag)
            .unwrap_or_default())
    }

    fn apply(&self, path: &Path, metadata: &TrackMetadata) -> Result<(), MetadataError> {
        let mut tagged = lofty::read_from_path(path)?;
        if tagged.primary_tag().is_none() {
            let tag_type = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged.primary_tag_mut().ok_or(MetadataError::NoTag)?;
        metadata.write_to_tag(tag, supports_artwork(path));
        tag.save_to_path(path, WriteOptions::default())?;
        Ok(())
    }
}

/// Opus output only gets text tags; its cover art is skipped.
fn supports_artwork(path: &Path) -> bool {
    !path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("opus"))
}

/// Copies tags from `source` onto `target`.
///
/// Returns `Ok(false)` when the source carries no metadata at all, which is
/// not an error.
pub fn propagate(
    store: &dyn MetadataStore,
    source: &Path,
    target: &Path,
) -> Result<bool, MetadataError> {
    let metadata = store.extract(source)?;
    if metadata.is_empty() {
        debug!(
            "No metadata found in {:?}",
            source.file_name().unwrap_or_default()
        );
        return Ok(false);
    }
    debug!(
        "Applying metadata to {:?}: {}",
        target.file_name().unwrap_or_default(),
        metadata.summary()
    );
    store.apply(target, &metadata)?;
    Ok(true)
}
