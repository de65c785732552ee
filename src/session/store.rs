//! Session persistence seam.

use super::model::Session;
use crate::error::PipelineError;
use dashmap::DashMap;

/// Storage for session records. Implementations must apply `update`
/// atomically with respect to other calls on the same id.
pub trait SessionStore: Send + Sync {
    fn insert(&self, session: Session) -> Result<(), PipelineError>;

    fn get(&self, id: &str) -> Result<Option<Session>, PipelineError>;

    /// Applies `apply` to the stored session and returns the updated copy.
    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Session) -> Result<(), PipelineError>,
    ) -> Result<Session, PipelineError>;

    fn remove(&self, id: &str) -> Result<Option<Session>, PipelineError>;

    fn list(&self) -> Result<Vec<Session>, PipelineError>;

    fn children_of(&self, parent_id: &str) -> Result<Vec<Session>, PipelineError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.parent_session_id.as_deref() == Some(parent_id))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: Session) -> Result<(), PipelineError> {
        if self.sessions.contains_key(&session.id) {
            return Err(PipelineError::invalid_state(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Session>, PipelineError> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Session) -> Result<(), PipelineError>,
    ) -> Result<Session, PipelineError> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))?;
        // Work on a copy so a rejected update leaves the record untouched.
        let mut draft = entry.clone();
        apply(&mut draft)?;
        draft.touch();
        *entry = draft.clone();
        Ok(draft)
    }

    fn remove(&self, id: &str) -> Result<Option<Session>, PipelineError> {
        Ok(self.sessions.remove(id).map(|(_, s)| s))
    }

    fn list(&self) -> Result<Vec<Session>, PipelineError> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{Direction, SessionInput, SessionStatus};

    fn session(name: &str) -> Session {
        Session::new(name, Direction::SpecToSystem, SessionInput::prompt("p"))
    }

    #[test]
    fn test_insert_get_remove() {
        let store = InMemorySessionStore::new();
        let s = session("a");
        let id = s.id.clone();
        store.insert(s).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().name, "a");
        assert!(store.remove(&id).unwrap().is_some());
        assert!(store.get(&id).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = InMemorySessionStore::new();
        let s = session("a");
        store.insert(s.clone()).unwrap();
        assert!(matches!(
            store.insert(s),
            Err(PipelineError::InvalidSessionState(_))
        ));
    }

    #[test]
    fn test_rejected_update_leaves_record() {
        let store = InMemorySessionStore::new();
        let s = session("a");
        let id = s.id.clone();
        store.insert(s).unwrap();

        let result = store.update(&id, &mut |s| {
            s.status = SessionStatus::Failed;
            Err(PipelineError::invalid_state("nope"))
        });
        assert!(result.is_err());
        assert_eq!(store.get(&id).unwrap().unwrap().status, SessionStatus::Pending);

        let updated = store
            .update(&id, &mut |s| {
                s.progress = 10;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.progress, 10);
    }

    #[test]
    fn test_update_missing_session() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store.update("ghost", &mut |_| Ok(())),
            Err(PipelineError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_children_of() {
        let store = InMemorySessionStore::new();
        let parent = session("parent");
        let mut child = session("child");
        child.parent_session_id = Some(parent.id.clone());
        let parent_id = parent.id.clone();
        store.insert(parent).unwrap();
        store.insert(child).unwrap();
        store.insert(session("other")).unwrap();

        let children = store.children_of(&parent_id).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "child");
    }
}
