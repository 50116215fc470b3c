use crate::color::ColorSet;

/// Cursor over the configured color cycle. Each rendered segment takes the next
/// pair, wrapping around at the end. One cursor is created per prompt render and
/// handed down to every block composer.
#[derive(Debug, Clone, Default)]
pub struct ColorCycle {
    colors: Vec<ColorSet>,
    position: usize,
}

impl ColorCycle {
    pub fn new(colors: Vec<ColorSet>) -> Self {
        Self {
            colors,
            position: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// The next pair, or `None` when no cycle is configured.
    pub fn next_colors(&mut self) -> Option<ColorSet> {
        if self.colors.is_empty() {
            return None;
        }

        let colors = self.colors[self.position % self.colors.len()].clone();
        self.position = (self.position + 1) % self.colors.len();
        Some(colors)
    }
}
