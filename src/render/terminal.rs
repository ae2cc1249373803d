/// Periodic text status block standing in for the plot window
use log::warn;
use std::collections::BTreeMap;
use std::io::Write;

use crate::models::Slot;
use crate::render::{RenderSurface, WidgetId};

/// What the terminal keeps of a plot: its size and time span.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SeriesSummary {
    points: usize,
    span: f64,
}

/// Surface that collects the latest titles and series extents and writes
/// them as one block per [`RenderSurface::present`].
pub struct TerminalSurface<W: Write> {
    out: W,
    titles: BTreeMap<WidgetId, String>,
    series: BTreeMap<WidgetId, SeriesSummary>,
    dirty: bool,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        TerminalSurface {
            out,
            titles: BTreeMap::new(),
            series: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn status_block(&self) -> String {
        let mut block = String::new();

        let global: Vec<&str> = [WidgetId::ElapsedTime, WidgetId::WindowLength]
            .iter()
            .filter_map(|id| self.titles.get(id).map(String::as_str))
            .collect();
        block.push_str(&global.join(" | "));
        block.push('\n');

        for slot in Slot::ALL {
            let mut parts = Vec::new();
            for (id, title) in self.titles.iter().filter(|(id, _)| id.slot() == Some(slot)) {
                match self.series.get(id) {
                    Some(summary) if summary.points > 0 => parts.push(format!(
                        "{} [{} pts/{:.1} s]",
                        title, summary.points, summary.span
                    )),
                    _ => parts.push(title.clone()),
                }
            }
            if !parts.is_empty() {
                block.push_str(&format!("{}: {}\n", slot, parts.join(" | ")));
            }
        }
        block
    }
}

impl<W: Write> RenderSurface for TerminalSurface<W> {
    fn set_series(&mut self, id: WidgetId, time: &[f64], values: &[i32]) {
        debug_assert_eq!(time.len(), values.len());
        let span = match (time.first(), time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let summary = SeriesSummary {
            points: time.len(),
            span,
        };
        if self.series.insert(id, summary) != Some(summary) {
            self.dirty = true;
        }
    }

    fn set_title(&mut self, id: WidgetId, title: &str) {
        if self.titles.get(&id).map(String::as_str) != Some(title) {
            self.titles.insert(id, title.to_string());
            self.dirty = true;
        }
    }

    fn present(&mut self) {
        if !self.dirty {
            return;
        }
        let block = self.status_block();
        if let Err(e) = self.out.write_all(block.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("Failed to write status: {}", e);
        }
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuxPlot, Channel};

    fn slot(n: usize) -> Slot {
        Slot::from_number(n).unwrap()
    }

    #[test]
    fn status_block_groups_widgets_by_device() {
        let mut surface = TerminalSurface::new(Vec::new());
        surface.set_title(WidgetId::ElapsedTime, "Elapsed Time: 00:05");
        surface.set_title(WidgetId::WindowLength, "Window Length: 30 s");
        surface.set_title(WidgetId::Channel(slot(1), Channel::Temperature), "Temperature: 22 °C");
        surface.set_series(
            WidgetId::Channel(slot(1), Channel::Temperature),
            &[1.0, 1.5, 3.0],
            &[20, 21, 22],
        );
        surface.set_title(WidgetId::Auxiliary(slot(1), AuxPlot::Flow), "Flow Sensor");
        surface.set_series(WidgetId::Auxiliary(slot(1), AuxPlot::Flow), &[], &[]);
        surface.set_title(WidgetId::SamplingRate(slot(3)), "Sampling Rate 3: -- Hz");
        surface.present();

        let text = String::from_utf8(surface.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Elapsed Time: 00:05 | Window Length: 30 s",
                "Device 1: Temperature: 22 °C [3 pts/2.0 s] | Flow Sensor",
                "Device 3: Sampling Rate 3: -- Hz",
            ]
        );
    }

    #[test]
    fn unchanged_state_is_not_written_again() {
        let mut surface = TerminalSurface::new(Vec::new());
        surface.set_title(WidgetId::ElapsedTime, "Elapsed Time: 00:00");
        surface.present();
        surface.set_title(WidgetId::ElapsedTime, "Elapsed Time: 00:00");
        surface.present();

        let text = String::from_utf8(surface.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
