use crate::config::ChatConfig;

/// A history page request after clamping caller-supplied values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl PageRequest {
    /// Absent or zero `limit` means the default page size; anything else is
    /// clamped to `[1, max_page_size]`. Absent or negative `offset` is 0.
    pub fn clamp(limit: Option<i64>, offset: Option<i64>, config: &ChatConfig) -> Self {
        let max = i64::from(config.max_page_size.max(1));
        let limit = match limit {
            None | Some(0) => i64::from(config.default_page_size),
            Some(n) => n,
        }
        .clamp(1, max);

        let offset = offset.unwrap_or(0).clamp(0, i64::from(u32::MAX));

        Self {
            limit: limit as u32,
            offset: offset as u32,
        }
    }
}
