//! Presentation side of the streaming core.
//!
//! The renderer only knows widgets by [`WidgetId`] and pushes data through a
//! [`RenderSurface`]; what the surface does with it (plots, a terminal
//! status block, a recording in tests) is up to the implementation.

pub mod terminal;
pub mod window;

use crate::models::{AuxPlot, Channel, Slot};

pub use terminal::TerminalSurface;
pub use window::WindowRenderer;

/// Address of one plot or label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WidgetId {
    Channel(Slot, Channel),
    Auxiliary(Slot, AuxPlot),
    SamplingRate(Slot),
    ElapsedTime,
    WindowLength,
}

impl WidgetId {
    /// Device section the widget belongs to; `None` for global labels.
    pub fn slot(self) -> Option<Slot> {
        match self {
            WidgetId::Channel(slot, _) | WidgetId::Auxiliary(slot, _) | WidgetId::SamplingRate(slot) => {
                Some(slot)
            }
            WidgetId::ElapsedTime | WidgetId::WindowLength => None,
        }
    }
}

pub trait RenderSurface {
    /// Replace the data of a plot. `time` and `values` have equal length.
    fn set_series(&mut self, id: WidgetId, time: &[f64], values: &[i32]);

    fn set_title(&mut self, id: WidgetId, title: &str);

    /// Make pending updates visible.
    fn present(&mut self) {}
}
