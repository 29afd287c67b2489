use chrono::Timelike;

/// The instant being sampled, as sent to the telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    hour: u32,
    second: u32,
}

impl Query {
    /// Values are not range-checked; callers supply them from a real clock.
    pub fn new(hour: u32, second: u32) -> Self {
        Self { hour, second }
    }

    pub fn from_time<T: Timelike>(time: &T) -> Self {
        Self::new(time.hour(), time.second())
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn second(&self) -> u32 {
        self.second
    }
}

/// Production of one energy source at the sampled instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub source: String,
    pub production: f64,
    pub factor: f64,
}

/// Decoded result of one exchange: per-source readings in wire order plus the aggregate total.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSet {
    readings: Vec<Reading>,
    total: f64,
}

impl ReadingSet {
    pub fn new(total: f64) -> Self {
        Self {
            readings: Vec::new(),
            total,
        }
    }

    /// Insert a reading. A source that is already present keeps its position
    /// and takes the new values.
    pub fn insert(&mut self, reading: Reading) {
        match self.readings.iter_mut().find(|r| r.source == reading.source) {
            Some(existing) => *existing = reading,
            None => self.readings.push(reading),
        }
    }

    pub fn with_reading(
        mut self,
        source: impl Into<String>,
        production: f64,
        factor: f64,
    ) -> Self {
        self.insert(Reading {
            source: source.into(),
            production,
            factor,
        });
        self
    }

    pub fn get(&self, source: &str) -> Option<&Reading> {
        self.readings.iter().find(|r| r.source == source)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}
