//! In-memory sensor directory.
//!
//! Each registered sensor owns its measurement history and a broadcast
//! channel that fans its events out to every subscriber stream.

use super::history::MeasurementHistory;
use crate::model::{Measurement, SensorEvent};
use crate::proto::{SensorInfoResponse, SensorOnlineStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct SensorRecord {
    id: Uuid,
    name: String,
    location: String,
    tags: Vec<String>,
    status: Mutex<SensorOnlineStatus>,
    history: Mutex<MeasurementHistory>,
    events: broadcast::Sender<SensorEvent>,
}

impl SensorRecord {
    fn new(
        id: Uuid,
        name: String,
        location: String,
        tags: Vec<String>,
        history_capacity: usize,
        event_buffer: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_buffer);
        Self {
            id,
            name,
            location,
            tags,
            status: Mutex::new(SensorOnlineStatus::SensorOffline),
            history: Mutex::new(MeasurementHistory::new(history_capacity)),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SensorOnlineStatus {
        *self.status.lock()
    }

    /// Marks the sensor online unless it already is. At most one measurement
    /// stream per sensor can win this.
    pub fn try_go_online(&self) -> bool {
        {
            let mut status = self.status.lock();
            if *status == SensorOnlineStatus::SensorOnline {
                return false;
            }
            *status = SensorOnlineStatus::SensorOnline;
        }
        self.publish(SensorEvent::StatusChanged {
            sensor_id: self.id.to_string(),
            status: SensorOnlineStatus::SensorOnline,
        });
        true
    }

    /// Marks the sensor offline and tells subscribers `announced`, which is
    /// `Offline` after a clean close and `Unknown` after a failure.
    pub fn go_offline(&self, announced: SensorOnlineStatus) {
        *self.status.lock() = SensorOnlineStatus::SensorOffline;
        self.publish(SensorEvent::StatusChanged {
            sensor_id: self.id.to_string(),
            status: announced,
        });
    }

    pub fn record(&self, measurement: Measurement) {
        self.history.lock().push(measurement.clone());
        self.publish(SensorEvent::Measurement(measurement));
    }

    pub fn latest(&self, depth: usize) -> Vec<Measurement> {
        self.history.lock().latest(depth)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|tag| tags.contains(tag))
    }

    pub fn to_info(&self) -> SensorInfoResponse {
        SensorInfoResponse {
            id: self.id.to_string(),
            name: self.name.clone(),
            location: self.location.clone(),
            tags: self.tags.clone(),
            online_status: self.status() as i32,
        }
    }

    fn publish(&self, event: SensorEvent) {
        // No receivers means nobody is subscribed; the event is dropped.
        if self.events.send(event).is_err() {
            tracing::trace!(sensor_id = %self.id, "No subscribers, event dropped");
        }
    }
}

/// Registered sensors keyed by id. Registration order is kept for listing.
pub struct SensorDirectory {
    sensors: RwLock<Vec<Arc<SensorRecord>>>,
    index: RwLock<HashMap<Uuid, Arc<SensorRecord>>>,
    history_capacity: usize,
    event_buffer: usize,
}

impl SensorDirectory {
    pub fn new(history_capacity: usize, event_buffer: usize) -> Self {
        Self {
            sensors: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
            history_capacity,
            event_buffer,
        }
    }

    /// Registers a sensor under `id`. Returns `None` when a sensor with the
    /// same name and location already exists.
    pub fn register(
        &self,
        id: Uuid,
        name: String,
        location: String,
        tags: Vec<String>,
    ) -> Option<Arc<SensorRecord>> {
        let mut sensors = self.sensors.write();
        if sensors
            .iter()
            .any(|s| s.id == id || (s.name == name && s.location == location))
        {
            return None;
        }

        let record = Arc::new(SensorRecord::new(
            id,
            name,
            location,
            tags,
            self.history_capacity,
            self.event_buffer,
        ));
        sensors.push(record.clone());
        self.index.write().insert(id, record.clone());
        Some(record)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<SensorRecord>> {
        self.index.read().get(id).cloned()
    }

    /// Sensors carrying any of `tags`; all sensors when `tags` is empty.
    pub fn find_by_tags(&self, tags: &[String]) -> Vec<Arc<SensorRecord>> {
        self.sensors
            .read()
            .iter()
            .filter(|sensor| tags.is_empty() || sensor.has_any_tag(tags))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn directory() -> SensorDirectory {
        SensorDirectory::new(10, 16)
    }

    fn register(dir: &SensorDirectory, name: &str, location: &str, tags: &[&str]) -> Option<Arc<SensorRecord>> {
        dir.register(
            Uuid::new_v4(),
            name.into(),
            location.into(),
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn test_duplicate_name_and_location_rejected() {
        let dir = directory();
        assert!(register(&dir, "temp-1", "lab", &["indoor"]).is_some());
        assert!(register(&dir, "temp-1", "lab", &[]).is_none());
        assert!(register(&dir, "temp-1", "attic", &[]).is_some());
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_find_by_tags() {
        let dir = directory();
        register(&dir, "a", "lab", &["indoor", "temp"]);
        register(&dir, "b", "roof", &["outdoor"]);
        register(&dir, "c", "yard", &["outdoor", "humidity"]);
        register(&dir, "d", "void", &[]);

        assert_eq!(dir.find_by_tags(&[]).len(), 4);
        assert_eq!(dir.find_by_tags(&["outdoor".into()]).len(), 2);
        assert_eq!(dir.find_by_tags(&["temp".into(), "humidity".into()]).len(), 2);
        assert!(dir.find_by_tags(&["missing".into()]).is_empty());
    }

    #[test]
    fn test_single_online_stream() {
        let dir = directory();
        let sensor = register(&dir, "a", "lab", &[]).unwrap();
        assert_eq!(sensor.status(), SensorOnlineStatus::SensorOffline);
        assert!(sensor.try_go_online());
        assert!(!sensor.try_go_online());
        sensor.go_offline(SensorOnlineStatus::SensorOffline);
        assert!(sensor.try_go_online());
    }

    #[tokio::test]
    async fn test_record_reaches_subscriber_and_history() {
        let dir = directory();
        let sensor = register(&dir, "a", "lab", &[]).unwrap();
        let mut events = sensor.subscribe();

        let measurement = Measurement {
            sensor_id: sensor.id().to_string(),
            value: 0.5,
            made_at: Utc::now(),
        };
        sensor.record(measurement.clone());

        assert_eq!(events.recv().await.unwrap(), SensorEvent::Measurement(measurement.clone()));
        assert_eq!(sensor.latest(5), vec![measurement]);
    }
}
