use super::mask::Mask;

/// Holds the most recent successfully derived mask for the current run.
///
/// Overwritten on every fresh mask, read (never cleared) on empty steps.
#[derive(Debug, Default)]
pub struct MaskCache {
    latest: Option<Mask>,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, mask: Mask) {
        self.latest = Some(mask);
    }

    pub fn latest(&self) -> Option<&Mask> {
        self.latest.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_none()
    }
}
