//! In-memory ward: task store with a change feed, rooms and patients.
//!
//! Stands in for the hosted data store. Push-channel behaviour can be
//! controlled at runtime so the synchronization engine's fallback paths
//! can be exercised: subscriptions can be left unconfirmed, refused, or cut.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{RwLock, broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};
use uuid::Uuid;

use wardops_core::backend::{FeedMessage, TaskBackend, TaskFeed};
use wardops_core::clock::{Clock, SystemClock};
use wardops_core::error::{BackendError, WardError};
use wardops_core::task::{NewTask, Task, TaskStatus};
use wardops_core::ward::{
    AdmitPatientArgs, CreateTaskArgs, DischargePatientArgs, FindRoomArgs, HospitalContext,
    Patient, PatientContext, PatientContextArgs, Room, RoomContext, RoomContextArgs, RoomStatus,
    WardOperations,
};

const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct WardState {
    tasks: Vec<Task>,
    rooms: Vec<Room>,
    patients: Vec<Patient>,
}

impl WardState {
    fn active_tasks_for(&self, location_id: &str) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.status.is_active() && t.target_location_id == location_id)
            .cloned()
            .collect()
    }

    /// Look a room up by id (`room-101`) or by number (`101`).
    fn room_index(&self, key: &str) -> Option<usize> {
        let key = key.trim();
        self.rooms
            .iter()
            .position(|r| r.id.eq_ignore_ascii_case(key) || r.number == key)
    }

    fn admitted_patient(&self, id: &str) -> Option<usize> {
        self.patients
            .iter()
            .position(|p| p.id == id && p.discharged_at.is_none())
    }
}

pub struct InMemoryWard {
    state: RwLock<WardState>,
    feed: RwLock<broadcast::Sender<FeedMessage>>,
    /// New and pending subscriptions confirm only while this is true.
    push_ready: watch::Sender<bool>,
    refuse_subscriptions: watch::Sender<bool>,
    clock: Arc<dyn Clock>,
}

impl InMemoryWard {
    /// An empty ward with a healthy push channel.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            state: RwLock::new(WardState::default()),
            feed: RwLock::new(feed),
            push_ready: watch::channel(true).0,
            refuse_subscriptions: watch::channel(false).0,
            clock: Arc::new(SystemClock),
        }
    }

    /// A small demo ward: three floors of rooms, one admitted patient.
    pub fn seeded() -> Self {
        let mut ward = Self::new();
        let mut state = WardState::default();
        let rooms: [(&str, &str, u8, RoomStatus); 12] = [
            ("101", "general", 1, RoomStatus::Available),
            ("102", "general", 1, RoomStatus::Occupied),
            ("103", "general", 1, RoomStatus::Available),
            ("104", "general", 1, RoomStatus::Available),
            ("105", "general", 1, RoomStatus::Cleaning),
            ("106", "general", 1, RoomStatus::Available),
            ("201", "icu", 2, RoomStatus::Available),
            ("202", "icu", 2, RoomStatus::Available),
            ("203", "general", 2, RoomStatus::Available),
            ("204", "general", 2, RoomStatus::Maintenance),
            ("301", "isolation", 3, RoomStatus::Available),
            ("302", "isolation", 3, RoomStatus::Available),
        ];
        state.rooms = rooms
            .into_iter()
            .map(|(number, room_type, floor, status)| Room {
                id: format!("room-{number}"),
                number: number.to_string(),
                room_type: room_type.to_string(),
                floor,
                status,
                patient_id: None,
            })
            .collect();
        state.rooms[1].patient_id = Some("patient-001".into());
        state.patients.push(Patient {
            id: "patient-001".into(),
            name: "Maria Lopez".into(),
            room_id: Some("room-102".into()),
            condition: Some("post-operative observation".into()),
            admitted_at: Utc::now(),
            discharged_at: None,
        });
        ward.state = RwLock::new(state);
        ward
    }

    /// Timestamps come from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscriptions stay unconfirmed until [`set_push_ready`](Self::set_push_ready).
    pub fn without_push(self) -> Self {
        self.push_ready.send_replace(false);
        self
    }

    /// Confirm (or stop confirming) push subscriptions. Pending ones confirm
    /// as soon as this turns true.
    pub fn set_push_ready(&self, ready: bool) {
        self.push_ready.send_replace(ready);
    }

    /// Make `subscribe` fail outright.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.send_replace(refuse);
    }

    /// Break every open feed: subscribers get a `ChannelError`, then the
    /// stream ends.
    pub async fn disconnect_feeds(&self, reason: &str) {
        let mut feed = self.feed.write().await;
        let _ = feed.send(FeedMessage::ChannelError {
            reason: reason.to_string(),
        });
        let (fresh, _) = broadcast::channel(FEED_CAPACITY);
        *feed = fresh;
        info!(reason, "Push feeds disconnected");
    }

    /// Store a task as-is, without a change event (e.g. history from an
    /// earlier session).
    pub async fn insert_existing(&self, task: Task) {
        self.state.write().await.tasks.push(task);
    }

    /// Delete a task and announce it on the feed.
    pub async fn delete_task(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let index = state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        state.tasks.remove(index);
        drop(state);
        self.publish(FeedMessage::Deleted { id: id.to_string() }).await;
        Ok(())
    }

    /// Every stored task.
    pub async fn tasks(&self) -> Vec<Task> {
        self.state.read().await.tasks.clone()
    }

    pub async fn rooms(&self) -> Vec<Room> {
        self.state.read().await.rooms.clone()
    }

    async fn publish(&self, message: FeedMessage) {
        // No subscribers is fine; the change is still stored.
        let _ = self.feed.read().await.send(message);
    }
}

impl Default for InMemoryWard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskBackend for InMemoryWard {
    async fn insert_task(&self, draft: NewTask) -> Result<Task, BackendError> {
        if draft.target_location_id.trim().is_empty() {
            return Err(BackendError::Storage("target location is required".into()));
        }
        let task = draft.into_task(self.clock.now());
        self.state.write().await.tasks.push(task.clone());
        debug!(task_id = %task.id, kind = task.kind.as_str(), "Task inserted");
        self.publish(FeedMessage::Inserted { task: task.clone() }).await;
        Ok(task)
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, BackendError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        task.transition(status, self.clock.now())?;
        let task = task.clone();
        drop(state);

        debug!(task_id = %task.id, status = %task.status, "Task updated");
        self.publish(FeedMessage::Updated { task: task.clone() }).await;
        Ok(task)
    }

    async fn fetch_active_since(&self, since: DateTime<Utc>) -> Result<Vec<Task>, BackendError> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .iter()
            .filter(|t| t.status.is_active() && t.created_at >= since)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn subscribe(&self) -> Result<TaskFeed, BackendError> {
        if *self.refuse_subscriptions.borrow() {
            return Err(BackendError::Subscription("push channel unavailable".into()));
        }

        let mut ready = self.push_ready.subscribe();
        let events = BroadcastStream::new(self.feed.read().await.subscribe())
            // a lagged receiver skips what it missed; the next poll or
            // update carries the full record anyway
            .filter_map(|item| async move { item.ok() });

        let confirmation = futures::stream::once(async move {
            let _ = ready.wait_for(|ready| *ready).await;
            FeedMessage::Subscribed
        });

        Ok(confirmation.chain(events).boxed())
    }
}

#[async_trait]
impl WardOperations for InMemoryWard {
    async fn create_task(&self, args: CreateTaskArgs) -> Result<Task, WardError> {
        if args.target_location_id.trim().is_empty() {
            return Err(WardError::Invalid("target_location_id must not be empty".into()));
        }
        Ok(self.insert_task(args.into_new_task()).await?)
    }

    async fn admit_patient(&self, args: AdmitPatientArgs) -> Result<Patient, WardError> {
        let name = args.name.trim();
        if name.is_empty() {
            return Err(WardError::Invalid("patient name must not be empty".into()));
        }

        let mut state = self.state.write().await;
        let index = match args.room_id.as_deref() {
            Some(key) => {
                let index = state
                    .room_index(key)
                    .ok_or_else(|| WardError::RoomNotFound(key.to_string()))?;
                let room = &state.rooms[index];
                if let Some(patient_id) = &room.patient_id {
                    return Err(WardError::RoomOccupied {
                        room_id: room.id.clone(),
                        patient_id: patient_id.clone(),
                    });
                }
                if room.status != RoomStatus::Available {
                    return Err(WardError::Invalid(format!(
                        "room {} is not available ({:?})",
                        room.id, room.status
                    )));
                }
                index
            }
            None => state
                .rooms
                .iter()
                .position(|r| r.status == RoomStatus::Available && r.patient_id.is_none())
                .ok_or(WardError::NoRoomAvailable)?,
        };

        let patient = Patient {
            id: format!("patient-{}", &Uuid::new_v4().simple().to_string()[..8]),
            name: name.to_string(),
            room_id: Some(state.rooms[index].id.clone()),
            condition: args.condition,
            admitted_at: self.clock.now(),
            discharged_at: None,
        };
        let room = &mut state.rooms[index];
        room.status = RoomStatus::Occupied;
        room.patient_id = Some(patient.id.clone());
        state.patients.push(patient.clone());

        info!(patient_id = %patient.id, room = ?patient.room_id, "Patient admitted");
        Ok(patient)
    }

    async fn discharge_patient(&self, args: DischargePatientArgs) -> Result<Patient, WardError> {
        let mut state = self.state.write().await;
        let index = state
            .admitted_patient(&args.patient_id)
            .ok_or_else(|| WardError::PatientNotFound(args.patient_id.clone()))?;

        let now = self.clock.now();
        let patient = &mut state.patients[index];
        patient.discharged_at = Some(now);
        let patient = patient.clone();

        if let Some(room_id) = &patient.room_id {
            if let Some(room) = state.rooms.iter_mut().find(|r| &r.id == room_id) {
                room.status = RoomStatus::Available;
                room.patient_id = None;
            }
        }

        info!(patient_id = %patient.id, "Patient discharged");
        Ok(patient)
    }

    async fn room_context(&self, args: RoomContextArgs) -> Result<RoomContext, WardError> {
        let state = self.state.read().await;
        let index = state
            .room_index(&args.room_id)
            .ok_or_else(|| WardError::RoomNotFound(args.room_id.clone()))?;
        let room = state.rooms[index].clone();
        let patient = room
            .patient_id
            .as_deref()
            .and_then(|id| state.admitted_patient(id))
            .map(|i| state.patients[i].clone());
        let active_tasks = state.active_tasks_for(&room.id);
        Ok(RoomContext {
            room,
            patient,
            active_tasks,
        })
    }

    async fn patient_context(&self, args: PatientContextArgs) -> Result<PatientContext, WardError> {
        let state = self.state.read().await;
        let patient = state
            .patients
            .iter()
            .find(|p| p.id == args.patient_id)
            .cloned()
            .ok_or_else(|| WardError::PatientNotFound(args.patient_id.clone()))?;
        let room = patient
            .room_id
            .as_deref()
            .filter(|_| patient.discharged_at.is_none())
            .and_then(|id| state.room_index(id))
            .map(|i| state.rooms[i].clone());
        let active_tasks = room
            .as_ref()
            .map(|r| state.active_tasks_for(&r.id))
            .unwrap_or_default();
        Ok(PatientContext {
            patient,
            room,
            active_tasks,
        })
    }

    async fn hospital_context(&self) -> Result<HospitalContext, WardError> {
        let state = self.state.read().await;
        Ok(HospitalContext {
            rooms_total: state.rooms.len(),
            rooms_available: state
                .rooms
                .iter()
                .filter(|r| r.status == RoomStatus::Available)
                .count(),
            patients_admitted: state
                .patients
                .iter()
                .filter(|p| p.discharged_at.is_none())
                .count(),
            rooms: state.rooms.clone(),
            active_tasks: state
                .tasks
                .iter()
                .filter(|t| t.status.is_active())
                .cloned()
                .collect(),
        })
    }

    async fn find_available_room(&self, args: FindRoomArgs) -> Result<Room, WardError> {
        let state = self.state.read().await;
        state
            .rooms
            .iter()
            .filter(|r| r.status == RoomStatus::Available && r.patient_id.is_none())
            .filter(|r| {
                args.room_type
                    .as_deref()
                    .is_none_or(|t| r.room_type.eq_ignore_ascii_case(t.trim()))
            })
            .find(|r| args.floor.is_none_or(|f| r.floor == f))
            .cloned()
            .ok_or(WardError::NoRoomAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wardops_core::clock::MonotonicClock;
    use wardops_core::task::TaskKind;

    fn food_to(room: &str) -> NewTask {
        NewTask::new(TaskKind::FoodDelivery, room)
    }

    #[tokio::test]
    async fn insert_and_update_are_announced() {
        let ward = InMemoryWard::new();
        let mut feed = ward.subscribe().await.unwrap();
        assert_eq!(feed.next().await, Some(FeedMessage::Subscribed));

        let task = ward.insert_task(food_to("room-101")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(
            feed.next().await,
            Some(FeedMessage::Inserted { task: task.clone() })
        );

        let started = ward
            .update_task_status(&task.id, TaskStatus::InProgress)
            .await
            .unwrap();
        assert!(started.started_at.is_some());
        assert!(matches!(
            feed.next().await,
            Some(FeedMessage::Updated { task }) if task.status == TaskStatus::InProgress
        ));

        ward.delete_task(&task.id).await.unwrap();
        assert_eq!(
            feed.next().await,
            Some(FeedMessage::Deleted { id: task.id })
        );
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let ward = InMemoryWard::new();
        let task = ward.insert_task(food_to("room-101")).await.unwrap();
        let err = ward
            .update_task_status(&task.id, TaskStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidTransition { .. }));

        let err = ward
            .update_task_status("missing", TaskStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_query_is_inclusive_and_active_only() {
        let clock = Arc::new(MonotonicClock::new());
        let ward = InMemoryWard::new().with_clock(clock.clone());

        let mut old = food_to("room-101").into_task(clock.origin() - chrono::Duration::hours(1));
        old.id = "old".into();
        ward.insert_existing(old).await;

        let at_start = ward.insert_task(food_to("room-102")).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let later = ward.insert_task(food_to("room-103")).await.unwrap();
        let done = ward.insert_task(food_to("room-104")).await.unwrap();
        ward.update_task_status(&done.id, TaskStatus::Cancelled)
            .await
            .unwrap();

        let active = ward.fetch_active_since(clock.origin()).await.unwrap();
        let ids: Vec<_> = active.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![at_start.id.as_str(), later.id.as_str()]);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_subscription_confirms_when_push_comes_up() {
        let ward = InMemoryWard::new().without_push();
        let mut feed = ward.subscribe().await.unwrap();

        let pending = tokio::time::timeout(Duration::from_secs(10), feed.next()).await;
        assert!(pending.is_err(), "feed must stay silent while push is down");

        ward.set_push_ready(true);
        assert_eq!(feed.next().await, Some(FeedMessage::Subscribed));
    }

    #[tokio::test]
    async fn refused_and_disconnected_feeds() {
        let ward = InMemoryWard::new();
        ward.refuse_subscriptions(true);
        assert!(matches!(
            ward.subscribe().await,
            Err(BackendError::Subscription(_))
        ));

        ward.refuse_subscriptions(false);
        let mut feed = ward.subscribe().await.unwrap();
        assert_eq!(feed.next().await, Some(FeedMessage::Subscribed));
        ward.disconnect_feeds("server restart").await;
        assert!(matches!(
            feed.next().await,
            Some(FeedMessage::ChannelError { .. })
        ));
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn admitting_fills_rooms_and_discharging_frees_them() {
        let ward = InMemoryWard::seeded();

        let err = ward
            .admit_patient(AdmitPatientArgs {
                name: "Tom Hale".into(),
                room_id: Some("room-102".into()),
                condition: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardError::RoomOccupied { .. }));

        let patient = ward
            .admit_patient(AdmitPatientArgs {
                name: "Tom Hale".into(),
                room_id: Some("201".into()),
                condition: Some("stable".into()),
            })
            .await
            .unwrap();
        assert_eq!(patient.room_id.as_deref(), Some("room-201"));

        let context = ward
            .room_context(RoomContextArgs {
                room_id: "room-201".into(),
            })
            .await
            .unwrap();
        assert_eq!(context.room.status, RoomStatus::Occupied);
        assert_eq!(context.patient.unwrap().name, "Tom Hale");

        ward.discharge_patient(DischargePatientArgs {
            patient_id: patient.id.clone(),
        })
        .await
        .unwrap();
        let again = ward
            .discharge_patient(DischargePatientArgs {
                patient_id: patient.id,
            })
            .await;
        assert!(matches!(again, Err(WardError::PatientNotFound(_))));

        let room = ward
            .find_available_room(FindRoomArgs {
                room_type: Some("ICU".into()),
                floor: None,
            })
            .await
            .unwrap();
        assert_eq!(room.id, "room-201");
    }

    #[tokio::test]
    async fn admission_without_room_takes_first_free_one() {
        let ward = InMemoryWard::seeded();
        let patient = ward
            .admit_patient(AdmitPatientArgs {
                name: "Ana".into(),
                room_id: None,
                condition: None,
            })
            .await
            .unwrap();
        assert_eq!(patient.room_id.as_deref(), Some("room-101"));
    }

    #[tokio::test]
    async fn contexts_include_active_tasks() {
        let ward = InMemoryWard::seeded();
        ward.create_task(CreateTaskArgs {
            kind: TaskKind::MedicationDelivery,
            target_location_id: "room-102".into(),
            source_location_id: Some("pharmacy".into()),
            priority: None,
            title: None,
            description: None,
            assigned_to_id: None,
        })
        .await
        .unwrap();

        let patient = ward
            .patient_context(PatientContextArgs {
                patient_id: "patient-001".into(),
            })
            .await
            .unwrap();
        assert_eq!(patient.room.unwrap().id, "room-102");
        assert_eq!(patient.active_tasks.len(), 1);

        let hospital = ward.hospital_context().await.unwrap();
        assert_eq!(hospital.rooms_total, 12);
        assert_eq!(hospital.patients_admitted, 1);
        assert_eq!(hospital.active_tasks.len(), 1);
        assert_eq!(hospital.rooms_available, 9);
    }

    #[tokio::test]
    async fn no_matching_room() {
        let ward = InMemoryWard::seeded();
        let err = ward
            .find_available_room(FindRoomArgs {
                room_type: Some("isolation".into()),
                floor: Some(1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardError::NoRoomAvailable));
    }
}
