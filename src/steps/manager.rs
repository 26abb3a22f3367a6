//! Gameplan step controller: page sequence and current index per session

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{require_label, WaypointError};
use crate::gateway::Gateway;
use crate::steps::edit::{GameplanEdit, GameplanEdited};
use crate::types::{Gameplan, Page, SessionId, StepState};

/// How a page relates to the session's current step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PagePhase {
    Previous,
    Current,
    Upcoming,
}

/// Result of a redirect
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Redirect {
    pub gameplan: Gameplan,
    pub step_state: StepState,
    /// True when the page was not in the gameplan and got appended
    pub appended: bool,
}

/// Owns the ordered page sequence and current step index of each session
#[derive(Clone)]
pub struct StepController {
    gateway: Gateway,
}

impl StepController {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn step_state(&self, id: &SessionId) -> Result<StepState, WaypointError> {
        self.gateway
            .step_state(id)
            .await?
            .ok_or_else(|| WaypointError::SessionNotFound(id.clone()))
    }

    pub async fn gameplan(&self, id: &SessionId) -> Result<Gameplan, WaypointError> {
        self.gateway
            .gameplan(id)
            .await?
            .ok_or_else(|| WaypointError::SessionNotFound(id.clone()))
    }

    /// Advance by exactly one. Returns the new index, or 0 when the session
    /// has no step row; callers treat 0 as "nothing advanced".
    pub async fn increment_step(&self, id: &SessionId) -> Result<u32, WaypointError> {
        match self.gateway.increment_step(id).await? {
            Some(row) => Ok(row.step),
            None => {
                tracing::warn!(session_id = %id, "increment found no step row");
                Ok(0)
            }
        }
    }

    /// Operator jump to an absolute index
    pub async fn set_step(&self, id: &SessionId, step: u32) -> Result<StepState, WaypointError> {
        self.gateway
            .set_step(id, step)
            .await
            .map_err(WaypointError::from_store)
    }

    pub async fn set_force_wait(
        &self,
        id: &SessionId,
        force_wait: bool,
    ) -> Result<StepState, WaypointError> {
        self.gateway
            .set_force_wait(id, force_wait)
            .await
            .map_err(WaypointError::from_store)
    }

    /// Replace the whole sequence. When the new sequence is shorter than the
    /// current index, the index is clamped to the new last page.
    pub async fn set_pages(
        &self,
        id: &SessionId,
        pages: Vec<Page>,
    ) -> Result<Gameplan, WaypointError> {
        validate_pages(&pages)?;
        let edited = self.edit(id, GameplanEdit::Replace(pages)).await?;
        if edited.effect.step_changed {
            tracing::info!(session_id = %id, to = edited.step_state.step, "clamped step to shortened gameplan");
        }
        Ok(edited.gameplan)
    }

    /// Append a page at the end; the step index is untouched
    pub async fn append_page(&self, id: &SessionId, page: Page) -> Result<Gameplan, WaypointError> {
        require_label("page name", &page.name)?;
        Ok(self.edit(id, GameplanEdit::Append(page)).await?.gameplan)
    }

    /// Jump to the named page, appending it first when it is not present
    pub async fn redirect_to_page(
        &self,
        id: &SessionId,
        page_name: &str,
    ) -> Result<Redirect, WaypointError> {
        require_label("page name", page_name)?;
        let edited = self
            .edit(id, GameplanEdit::Redirect(page_name.to_string()))
            .await?;
        let appended = edited.effect.appended;
        tracing::info!(session_id = %id, page = page_name, index = edited.step_state.step, appended, "redirected");

        Ok(Redirect {
            gameplan: edited.gameplan,
            step_state: edited.step_state,
            appended,
        })
    }

    /// Persist `next` (the sequence after moving `from` to `to`) and remap
    /// the current index so the current page keeps its identity.
    pub async fn reorder(
        &self,
        id: &SessionId,
        from: usize,
        to: usize,
        next: Vec<Page>,
    ) -> Result<(Gameplan, StepState), WaypointError> {
        validate_pages(&next)?;
        let edited = self.edit(id, GameplanEdit::Reorder { from, to, next }).await?;
        Ok((edited.gameplan, edited.step_state))
    }

    /// Move a page by index within the stored sequence. Out-of-range or
    /// equal indices return the current rows unchanged.
    pub async fn move_page(
        &self,
        id: &SessionId,
        from: usize,
        to: usize,
    ) -> Result<(Gameplan, StepState), WaypointError> {
        let edited = self.edit(id, GameplanEdit::Move { from, to }).await?;
        if !edited.effect.gameplan_changed {
            tracing::debug!(session_id = %id, from, to, pages = edited.gameplan.len(), "reorder is a no-op");
        }
        Ok((edited.gameplan, edited.step_state))
    }

    async fn edit(&self, id: &SessionId, edit: GameplanEdit) -> Result<GameplanEdited, WaypointError> {
        self.gateway
            .edit_gameplan(id, edit)
            .await
            .map_err(WaypointError::from_store)
    }

    /// Phase of every page relative to the current step
    pub async fn progress(
        &self,
        id: &SessionId,
    ) -> Result<Vec<(Page, PagePhase)>, WaypointError> {
        let gameplan = self.gameplan(id).await?;
        let state = self.step_state(id).await?;
        Ok(classify(&gameplan.pages, state.step as usize))
    }
}

fn validate_pages(pages: &[Page]) -> Result<(), WaypointError> {
    if pages.is_empty() {
        return Err(WaypointError::Validation(
            "gameplan must contain at least one page".to_string(),
        ));
    }
    for page in pages {
        require_label("page name", &page.name)?;
    }
    Ok(())
}

/// Classify pages as previous, current or upcoming
pub fn classify(pages: &[Page], current: usize) -> Vec<(Page, PagePhase)> {
    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let phase = match i.cmp(&current) {
                std::cmp::Ordering::Less => PagePhase::Previous,
                std::cmp::Ordering::Equal => PagePhase::Current,
                std::cmp::Ordering::Greater => PagePhase::Upcoming,
            };
            (page.clone(), phase)
        })
        .collect()
}

/// Format progress for display, e.g. `Welcome > [Details] > Done`
pub fn format_progress(pages: &[Page], current: usize) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            if i == current {
                format!("[{}]", page.name)
            } else {
                page.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Channel, EventBus, Payload};
    use crate::steps::reorder::move_item;
    use crate::store::MemoryStore;
    use crate::types::{SessionOrigin, SessionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pages(names: &[&str]) -> Vec<Page> {
        names.iter().map(|n| Page::new(*n)).collect()
    }

    async fn controller(names: &[&str]) -> (StepController, Gateway, SessionId) {
        let gateway = Gateway::new(Arc::new(MemoryStore::new()), EventBus::new());
        let session = gateway
            .create_session(SessionOrigin::default(), SessionStatus::Active, pages(names))
            .await
            .unwrap();
        (StepController::new(gateway.clone()), gateway, session.id)
    }

    #[tokio::test]
    async fn test_increment_n_times_yields_n() {
        let (steps, _, id) = controller(&["A", "B", "C"]).await;
        for expected in 1..=5 {
            assert_eq!(steps.increment_step(&id).await.unwrap(), expected);
            // Interleaved reads never disturb the count
            assert_eq!(steps.step_state(&id).await.unwrap().step, expected);
        }
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (steps, _, id) = controller(&["A"]).await;
        let mut handles = Vec::new();
        for _ in 0..20 {
            let steps = steps.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { steps.increment_step(&id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(steps.step_state(&id).await.unwrap().step, 20);
    }

    #[tokio::test]
    async fn test_increment_unknown_session_is_zero() {
        let (steps, _, _) = controller(&["A"]).await;
        assert_eq!(
            steps.increment_step(&SessionId::from("ghost")).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_append_leaves_step_untouched() {
        let (steps, gateway, id) = controller(&["A", "B"]).await;
        steps.set_step(&id, 1).await.unwrap();

        let step_events = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&step_events);
        let _sub = gateway.subscribe(&id, Channel::StepState, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let plan = steps.append_page(&id, Page::new("C")).await.unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(steps.step_state(&id).await.unwrap().step, 1);
        assert_eq!(step_events.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_redirect_to_existing_page() {
        let (steps, _, id) = controller(&["A", "B", "C"]).await;
        let redirect = steps.redirect_to_page(&id, "C").await.unwrap();
        assert!(!redirect.appended);
        assert_eq!(redirect.step_state.step, 2);
        assert_eq!(redirect.gameplan.len(), 3);
    }

    #[tokio::test]
    async fn test_redirect_to_unknown_page_appends_then_jumps() {
        let (steps, gateway, id) = controller(&["A", "B"]).await;
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s1 = Arc::clone(&seen);
        let _g = gateway.subscribe(&id, Channel::Gameplan, move |p| {
            s1.lock().unwrap().push(p.channel());
        });
        let s2 = Arc::clone(&seen);
        let _s = gateway.subscribe(&id, Channel::StepState, move |p| {
            s2.lock().unwrap().push(p.channel());
        });

        let redirect = steps.redirect_to_page(&id, "Extra").await.unwrap();
        assert!(redirect.appended);
        assert_eq!(redirect.step_state.step, 2);
        assert_eq!(redirect.gameplan.page_at(2).unwrap().name, "Extra");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Channel::Gameplan, Channel::StepState]
        );
    }

    #[tokio::test]
    async fn test_reorder_moves_current_with_item() {
        let (steps, _, id) = controller(&["A", "B", "C", "D"]).await;
        steps.set_step(&id, 2).await.unwrap();
        let (plan, state) = steps.move_page(&id, 2, 0).await.unwrap();
        assert_eq!(state.step, 0);
        assert_eq!(plan.page_at(0).unwrap().name, "C");
    }

    #[tokio::test]
    async fn test_reorder_remaps_crossed_current() {
        let (steps, _, id) = controller(&["A", "B", "C", "D"]).await;
        steps.set_step(&id, 2).await.unwrap();
        let (_, state) = steps.move_page(&id, 0, 2).await.unwrap();
        assert_eq!(state.step, 1);

        steps.set_step(&id, 1).await.unwrap();
        let (_, state) = steps.move_page(&id, 3, 0).await.unwrap();
        assert_eq!(state.step, 2);
    }

    #[tokio::test]
    async fn test_reorder_without_step_change_publishes_gameplan_only() {
        let (steps, gateway, id) = controller(&["A", "B", "C", "D"]).await;
        let step_events = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&step_events);
        let _sub = gateway.subscribe(&id, Channel::StepState, move |p| {
            assert!(matches!(p, Payload::StepState(_)));
            c.fetch_add(1, Ordering::SeqCst);
        });

        // current = 0, move 2 -> 3 does not cross it
        steps.move_page(&id, 2, 3).await.unwrap();
        assert_eq!(step_events.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_move_page_out_of_range_is_noop() {
        let (steps, _, id) = controller(&["A", "B", "C"]).await;
        steps.set_step(&id, 1).await.unwrap();
        let (plan, state) = steps.move_page(&id, 0, 7).await.unwrap();
        assert_eq!(plan.pages, pages(&["A", "B", "C"]));
        assert_eq!(state.step, 1);
    }

    #[tokio::test]
    async fn test_reorder_with_explicit_sequence() {
        let (steps, _, id) = controller(&["A", "B", "C", "D"]).await;
        steps.set_step(&id, 2).await.unwrap();
        let next = move_item(&pages(&["A", "B", "C", "D"]), 0, 2);
        let (plan, state) = steps.reorder(&id, 0, 2, next).await.unwrap();
        assert_eq!(plan.pages, pages(&["B", "C", "A", "D"]));
        assert_eq!(state.step, 1);

        let err = steps.reorder(&id, 0, 1, Vec::new()).await.unwrap_err();
        assert!(matches!(err, WaypointError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_keep_every_page() {
        for _ in 0..50 {
            let (steps, _, id) = controller(&["A", "B", "C", "D"]).await;
            let mut handles = Vec::new();
            for i in 0..8 {
                let (steps, id) = (steps.clone(), id.clone());
                handles.push(tokio::spawn(async move {
                    steps.append_page(&id, Page::new(format!("P{i}"))).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
            assert_eq!(steps.gameplan(&id).await.unwrap().len(), 12);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redirects_and_moves_keep_step_on_a_page() {
        for _ in 0..50 {
            let (steps, _, id) = controller(&["A", "B", "C", "D"]).await;
            let mut handles = Vec::new();
            for i in 0..4 {
                let (redirect_steps, redirect_id) = (steps.clone(), id.clone());
                handles.push(tokio::spawn(async move {
                    redirect_steps.redirect_to_page(&redirect_id, &format!("R{i}")).await.map(|_| ())
                }));
                let (steps, id) = (steps.clone(), id.clone());
                handles.push(tokio::spawn(async move {
                    steps.move_page(&id, 0, 3).await.map(|_| ())
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let plan = steps.gameplan(&id).await.unwrap();
            assert_eq!(plan.len(), 8);
            for i in 0..4 {
                assert!(plan.position(&format!("R{i}")).is_some());
            }
            let state = steps.step_state(&id).await.unwrap();
            assert!((state.step as usize) < plan.len());
        }
    }

    #[tokio::test]
    async fn test_set_pages_clamps_step() {
        let (steps, _, id) = controller(&["A", "B", "C", "D"]).await;
        steps.set_step(&id, 3).await.unwrap();
        steps.set_pages(&id, pages(&["A", "B"])).await.unwrap();
        assert_eq!(steps.step_state(&id).await.unwrap().step, 1);
    }

    #[tokio::test]
    async fn test_set_pages_rejects_empty() {
        let (steps, _, id) = controller(&["A"]).await;
        let err = steps.set_pages(&id, Vec::new()).await.unwrap_err();
        assert!(matches!(err, WaypointError::Validation(_)));
    }

    #[tokio::test]
    async fn test_set_step_unknown_session() {
        let (steps, _, _) = controller(&["A"]).await;
        let err = steps
            .set_step(&SessionId::from("ghost"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, WaypointError::SessionNotFound(_)));
    }

    #[test]
    fn test_classify_and_format() {
        let plan = pages(&["Welcome", "Details", "Done"]);
        let phases: Vec<PagePhase> = classify(&plan, 1).into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            phases,
            vec![PagePhase::Previous, PagePhase::Current, PagePhase::Upcoming]
        );
        assert_eq!(format_progress(&plan, 1), "Welcome > [Details] > Done");
    }
}
