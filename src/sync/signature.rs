use std::collections::HashMap;

use super::snapshot::Subject;

/// What a cached signature stands for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Title,
    DateRange(&'static str),
    Chips,
}

/// Order-insensitive signature of a multi-valued property
pub fn signature<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut values: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
    values.sort();
    values.join("|")
}

/// Last-sent signatures, per entity and channel, for one session
#[derive(Debug, Default, Clone)]
pub struct SignatureCache {
    sent: HashMap<(Subject, Channel), String>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unchanged(&self, subject: &Subject, channel: &Channel, signature: &str) -> bool {
        self.sent
            .get(&(subject.clone(), channel.clone()))
            .is_some_and(|last| last == signature)
    }

    pub fn record(&mut self, subject: &Subject, channel: Channel, signature: String) {
        self.sent.insert((subject.clone(), channel), signature);
    }

    /// Drop everything cached for an entity whose page went away
    pub fn forget(&mut self, subject: &Subject) {
        self.sent.retain(|(cached, _), _| cached != subject);
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}
