// src/world/anchor.rs
//
// Sample-space anchor.
//
// World tile keys never move; what moves is the frame that height lookups
// and placement seeds are evaluated in. In `Authored` mode sample space is
// world space. In `Freeflight` mode the anchor origin is subtracted, so the
// viewer can travel without the sampled coordinates growing.

use glam::{DVec2, DVec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnchorMode {
    Authored,
    Freeflight,
}

/// Immutable view of the anchor. Cheap to copy into worker requests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorState {
    pub mode: AnchorMode,
    pub origin: DVec2,
    /// Bumped on every mode switch; results computed under an older epoch are stale.
    pub epoch: u64,
}

impl Default for AnchorState {
    fn default() -> Self {
        Self { mode: AnchorMode::Authored, origin: DVec2::ZERO, epoch: 0 }
    }
}

impl AnchorState {
    #[inline]
    pub fn to_sample_space(&self, wx: f64, wz: f64) -> (f64, f64) {
        match self.mode {
            AnchorMode::Authored => (wx, wz),
            AnchorMode::Freeflight => (wx - self.origin.x, wz - self.origin.y),
        }
    }
}

/// Owner of the anchor. The two mode-switch methods are the only writers.
#[derive(Debug, Default)]
pub struct CoordinateAnchor {
    state: AnchorState,
}

impl CoordinateAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> AnchorState {
        self.state
    }

    #[inline]
    pub fn mode(&self) -> AnchorMode {
        self.state.mode
    }

    #[inline]
    pub fn to_sample_space(&self, wx: f64, wz: f64) -> (f64, f64) {
        self.state.to_sample_space(wx, wz)
    }

    /// Snapshots `position` (xz) as the new origin. Returns false if already
    /// in freeflight, in which case nothing changes.
    pub fn activate_freeflight(&mut self, position: DVec3) -> bool {
        if self.state.mode == AnchorMode::Freeflight {
            return false;
        }
        self.state = AnchorState {
            mode: AnchorMode::Freeflight,
            origin: DVec2::new(position.x, position.z),
            epoch: self.state.epoch + 1,
        };
        log::info!(
            "anchor: freeflight at origin ({:.2}, {:.2}), epoch {}",
            position.x,
            position.z,
            self.state.epoch
        );
        true
    }

    pub fn return_to_authored(&mut self) -> bool {
        if self.state.mode == AnchorMode::Authored {
            return false;
        }
        self.state = AnchorState {
            mode: AnchorMode::Authored,
            origin: DVec2::ZERO,
            epoch: self.state.epoch + 1,
        };
        log::info!("anchor: back to authored, epoch {}", self.state.epoch);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::sampler::sample_world;

    #[test]
    fn authored_is_identity() {
        let a = CoordinateAnchor::new();
        assert_eq!(a.to_sample_space(12.5, -3.0), (12.5, -3.0));
    }

    #[test]
    fn freeflight_height_matches_authored_offset() {
        let sampler = |x: f64, z: f64| x * 0.5 + z * z * 0.01;

        let authored = AnchorState::default();
        let expected = sample_world(&sampler, &authored, 5.0, 5.0);

        let mut anchor = CoordinateAnchor::new();
        anchor.activate_freeflight(DVec3::new(100.0, 30.0, 200.0));
        let got = sample_world(&sampler, &anchor.state(), 105.0, 205.0);

        assert_eq!(got, expected);
    }

    #[test]
    fn switches_are_idempotent() {
        let mut a = CoordinateAnchor::new();
        assert!(!a.return_to_authored());
        assert_eq!(a.state().epoch, 0);

        assert!(a.activate_freeflight(DVec3::new(1.0, 0.0, 2.0)));
        let after = a.state();
        assert!(!a.activate_freeflight(DVec3::new(50.0, 0.0, 50.0)));
        assert_eq!(a.state(), after);

        assert!(a.return_to_authored());
        assert_eq!(a.mode(), AnchorMode::Authored);
        assert_eq!(a.state().epoch, 2);
    }
}
