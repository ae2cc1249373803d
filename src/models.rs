use std::fmt;

use time::OffsetDateTime;

/// Number of fixed device slots.
pub const SLOT_COUNT: usize = 3;

/// Fixed identity of a device section ("Device 1" .. "Device 3").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(usize);

impl Slot {
    pub const ALL: [Slot; SLOT_COUNT] = [Slot(0), Slot(1), Slot(2)];

    /// Look up a slot by its user-facing number (1-based).
    pub fn from_number(number: usize) -> Option<Slot> {
        (1..=SLOT_COUNT).contains(&number).then(|| Slot(number - 1))
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn number(self) -> usize {
        self.0 + 1
    }

    /// Capability tag attached to this slot.
    pub fn kind(self) -> DeviceKind {
        match self.0 {
            0 => DeviceKind::FlowSensor,
            1 => DeviceKind::AudioSensor,
            _ => DeviceKind::Headless,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device {}", self.number())
    }
}

/// What a device section displays besides its raw stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Five channel plots plus a flow sensor plot.
    FlowSensor,
    /// Five channel plots plus a dedicated audio plot.
    AudioSensor,
    /// No plots; the device is streamed and logged only.
    Headless,
}

impl DeviceKind {
    pub fn channel_plots(self) -> &'static [Channel] {
        match self {
            DeviceKind::FlowSensor | DeviceKind::AudioSensor => &Channel::ALL,
            DeviceKind::Headless => &[],
        }
    }

    pub fn auxiliary_plot(self) -> Option<AuxPlot> {
        match self {
            DeviceKind::FlowSensor => Some(AuxPlot::Flow),
            DeviceKind::AudioSensor => Some(AuxPlot::Audio),
            DeviceKind::Headless => None,
        }
    }
}

/// One of the five telemetry channels carried by every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Temperature,
    Audio,
    X,
    Y,
    Z,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Temperature,
        Channel::Audio,
        Channel::X,
        Channel::Y,
        Channel::Z,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Channel::Temperature => "Temperature",
            Channel::Audio => "Audio Level",
            Channel::X => "X",
            Channel::Y => "Y",
            Channel::Z => "Z",
        }
    }

    /// Plot title showing the latest value, or `--` before any data.
    pub fn title(self, value: Option<i32>) -> String {
        match (self, value) {
            (Channel::Temperature, Some(v)) => format!("{}: {v} °C", self.label()),
            (_, Some(v)) => format!("{}: {v}", self.label()),
            (_, None) => format!("{}: --", self.label()),
        }
    }
}

/// Extra per-kind plot shown below the channel plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxPlot {
    Flow,
    Audio,
}

impl AuxPlot {
    pub fn title(self) -> &'static str {
        match self {
            AuxPlot::Flow => "Flow Sensor",
            AuxPlot::Audio => "Audio",
        }
    }

    /// Channel feeding this plot. The flow plot has no source in the
    /// five-field payload and stays empty.
    pub fn source(self) -> Option<Channel> {
        match self {
            AuxPlot::Flow => None,
            AuxPlot::Audio => Some(Channel::Audio),
        }
    }
}

/// The five channel values decoded from one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub temperature: i32,
    pub audio: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Reading {
    pub fn value(&self, channel: Channel) -> i32 {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Audio => self.audio,
            Channel::X => self.x,
            Channel::Y => self.y,
            Channel::Z => self.z,
        }
    }
}

/// A reading stamped with the monotonic time it was captured at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds on the process-wide monotonic timebase.
    pub captured_at: f64,
    pub temperature: i32,
    pub audio: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Sample {
    pub fn new(captured_at: f64, reading: Reading) -> Self {
        Sample {
            captured_at,
            temperature: reading.temperature,
            audio: reading.audio,
            x: reading.x,
            y: reading.y,
            z: reading.z,
        }
    }

    pub fn reading(&self) -> Reading {
        Reading {
            temperature: self.temperature,
            audio: self.audio,
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }
}

/// Last column of a log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLabel {
    /// A routine streamed sample.
    Streamed,
    /// A manually triggered snapshot, numbered from 1.
    Event(u32),
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventLabel::Streamed => f.write_str("false"),
            EventLabel::Event(n) => write!(f, "event {n}"),
        }
    }
}

/// One line of a device log file.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub timestamp: OffsetDateTime,
    pub reading: Reading,
    pub label: EventLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_map_to_fixed_kinds() {
        assert_eq!(Slot::from_number(1).map(Slot::kind), Some(DeviceKind::FlowSensor));
        assert_eq!(Slot::from_number(2).map(Slot::kind), Some(DeviceKind::AudioSensor));
        assert_eq!(Slot::from_number(3).map(Slot::kind), Some(DeviceKind::Headless));
        assert_eq!(Slot::from_number(0), None);
        assert_eq!(Slot::from_number(4), None);
        assert_eq!(Slot::ALL[2].to_string(), "Device 3");
    }

    #[test]
    fn headless_devices_have_no_plots() {
        assert!(DeviceKind::Headless.channel_plots().is_empty());
        assert_eq!(DeviceKind::Headless.auxiliary_plot(), None);
        assert_eq!(DeviceKind::FlowSensor.channel_plots().len(), 5);
    }

    #[test]
    fn titles_show_latest_value() {
        assert_eq!(Channel::Temperature.title(Some(22)), "Temperature: 22 °C");
        assert_eq!(Channel::Audio.title(Some(-3)), "Audio Level: -3");
        assert_eq!(Channel::Z.title(None), "Z: --");
    }

    #[test]
    fn labels_render_like_the_log_column() {
        assert_eq!(EventLabel::Streamed.to_string(), "false");
        assert_eq!(EventLabel::Event(7).to_string(), "event 7");
    }
}
