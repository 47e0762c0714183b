use pdf_engine::PageSize;

/// Continuous vertical layout of fit-width pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub viewport_width_px: f32,
    pub viewport_height_px: f32,
    pub scroll_offset_px: f32,
    pub page_heights_px: Vec<f32>,
    pub page_spacing_px: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            viewport_width_px: 0.0,
            viewport_height_px: 0.0,
            scroll_offset_px: 0.0,
            page_heights_px: Vec::new(),
            page_spacing_px: 16.0,
        }
    }
}

pub fn fit_width_scale(viewport_width_px: f32, page_width_pt: f32) -> f32 {
    if viewport_width_px <= 0.0 || page_width_pt <= 0.0 {
        return 1.0;
    }

    viewport_width_px / page_width_pt
}

pub fn layout_page_heights(page_sizes: &[PageSize], viewport_width_px: f32) -> Vec<f32> {
    page_sizes
        .iter()
        .map(|size| size.height_pt * fit_width_scale(viewport_width_px, size.width_pt))
        .collect()
}

/// The page under the vertical center of the viewport.
pub fn current_page_from_viewport(state: &ViewportState) -> u32 {
    if state.page_heights_px.is_empty() {
        return 0;
    }

    let center_offset = (state.scroll_offset_px + state.viewport_height_px / 2.0).max(0.0);
    page_at_offset(center_offset, state)
}

pub fn page_start_offset(page_index: u32, state: &ViewportState) -> f32 {
    let mut cursor = 0.0;

    for (index, page_height) in state.page_heights_px.iter().enumerate() {
        if index as u32 == page_index {
            return cursor;
        }
        cursor += page_height + state.page_spacing_px;
    }

    cursor
}

pub fn max_scroll_offset(state: &ViewportState) -> f32 {
    let pages = state.page_heights_px.len();
    if pages == 0 {
        return 0.0;
    }

    let content: f32 = state.page_heights_px.iter().sum::<f32>()
        + state.page_spacing_px * (pages - 1) as f32;
    (content - state.viewport_height_px).max(0.0)
}

fn page_at_offset(offset: f32, state: &ViewportState) -> u32 {
    let mut cursor = 0.0;

    for (index, page_height) in state.page_heights_px.iter().enumerate() {
        let page_end = cursor + page_height;
        if offset <= page_end {
            return index as u32;
        }

        cursor = page_end + state.page_spacing_px;
    }

    state.page_heights_px.len().saturating_sub(1) as u32
}
