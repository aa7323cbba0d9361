use serde::{Deserialize, Serialize};

use crate::error::{MixError, Result};
use crate::key::{Key, NUM_KEYS};

/// A track as resolved by the caller: identifier, tempo and base key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub bpm: u32,
    pub key: Key,
}

impl Track {
    pub fn new(id: impl Into<String>, bpm: u32, key: Key) -> Self {
        Self {
            id: id.into(),
            bpm,
            key,
        }
    }
}

/// Reject tracks the solvers cannot score.
pub fn validate_tracks(tracks: &[Track]) -> Result<()> {
    for (index, track) in tracks.iter().enumerate() {
        if track.bpm == 0 {
            return Err(MixError::invalid_track(
                index,
                format!("'{}' has no BPM", track.id),
            ));
        }
    }
    Ok(())
}

/// Build tracks from the raw parallel arrays used by the bindings.
///
/// Identifiers are the list positions.
pub fn tracks_from_raw(bpms: &[i64], key_ids: &[i64]) -> Result<Vec<Track>> {
    if bpms.len() != key_ids.len() {
        return Err(MixError::invalid_track(
            bpms.len().min(key_ids.len()),
            format!(
                "got {} BPMs but {} keys",
                bpms.len(),
                key_ids.len()
            ),
        ));
    }
    bpms.iter()
        .zip(key_ids)
        .enumerate()
        .map(|(index, (&bpm, &key_id))| -> Result<Track> {
            let bpm = u32::try_from(bpm)
                .ok()
                .filter(|&b| b > 0)
                .ok_or_else(|| MixError::invalid_track(index, format!("BPM {bpm} is not positive")))?;
            let key = usize::try_from(key_id)
                .ok()
                .and_then(Key::from_index)
                .ok_or_else(|| {
                    MixError::invalid_track(
                        index,
                        format!("key id {key_id} is outside 0..{NUM_KEYS}"),
                    )
                })?;
            Ok(Track::new(index.to_string(), bpm, key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bpm_is_rejected_with_index() {
        let tracks = vec![
            Track::new("a", 120, "8A".parse().unwrap()),
            Track::new("b", 0, "8A".parse().unwrap()),
        ];
        match validate_tracks(&tracks) {
            Err(MixError::InvalidTrack { index, reason }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("'b'"), "got: {reason}");
            }
            other => panic!("expected InvalidTrack, got {other:?}"),
        }
    }

    #[test]
    fn raw_arrays_are_checked() {
        let tracks = tracks_from_raw(&[120, 128], &[0, 23]).unwrap();
        assert_eq!(tracks[1].key.to_string(), "12B");
        assert_eq!(tracks[0].id, "0");

        assert!(matches!(
            tracks_from_raw(&[120, -4], &[0, 1]),
            Err(MixError::InvalidTrack { index: 1, .. })
        ));
        assert!(matches!(
            tracks_from_raw(&[120, 128], &[0, 24]),
            Err(MixError::InvalidTrack { index: 1, .. })
        ));
        assert!(tracks_from_raw(&[120], &[0, 1]).is_err());
    }

    #[test]
    fn deserializes_from_json() {
        let track: Track =
            serde_json::from_str(r#"{"id": "x", "bpm": 124, "key": "Am"}"#).unwrap();
        assert_eq!(track.key.to_string(), "8A");
        let bad = serde_json::from_str::<Track>(r#"{"id": "x", "bpm": 124, "key": "14A"}"#);
        assert!(bad.is_err());
    }
}
