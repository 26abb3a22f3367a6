//! Gameplan edits applied by the record store under a single write.
//!
//! Each edit changes the page sequence and the step index together, so a
//! concurrent edit can never observe or overwrite a half-applied one.

use crate::steps::reorder::{move_item, remap_index};
use crate::types::{Gameplan, Page, StepState};

#[derive(Debug, Clone, PartialEq)]
pub enum GameplanEdit {
    /// Replace the sequence, clamping the step to the new last page
    Replace(Vec<Page>),
    /// Append a page; the step is untouched
    Append(Page),
    /// Jump to the named page, appending it when absent
    Redirect(String),
    /// Store `next` and remap the step for a move from `from` to `to`
    Reorder {
        from: usize,
        to: usize,
        next: Vec<Page>,
    },
    /// Move one stored page. Out-of-range or equal indices change nothing.
    Move { from: usize, to: usize },
}

/// Which rows an edit touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditEffect {
    pub gameplan_changed: bool,
    pub step_changed: bool,
    /// A redirect target that was missing and got appended
    pub appended: bool,
}

/// Rows after an edit was committed
#[derive(Debug, Clone, PartialEq)]
pub struct GameplanEdited {
    pub gameplan: Gameplan,
    pub step_state: StepState,
    pub effect: EditEffect,
}

impl GameplanEdit {
    /// Apply to the stored sequence and step index in place
    pub fn apply(self, pages: &mut Vec<Page>, step: &mut u32) -> EditEffect {
        let mut effect = EditEffect::default();
        match self {
            GameplanEdit::Replace(next) => {
                *pages = next;
                effect.gameplan_changed = true;
                if let Some(last) = pages.len().checked_sub(1) {
                    let last = last as u32;
                    if *step > last {
                        *step = last;
                        effect.step_changed = true;
                    }
                }
            }
            GameplanEdit::Append(page) => {
                pages.push(page);
                effect.gameplan_changed = true;
            }
            GameplanEdit::Redirect(name) => {
                let index = match pages.iter().position(|p| p.name == name) {
                    Some(index) => index,
                    None => {
                        pages.push(Page::new(name));
                        effect.gameplan_changed = true;
                        effect.appended = true;
                        pages.len() - 1
                    }
                };
                *step = index as u32;
                effect.step_changed = true;
            }
            GameplanEdit::Reorder { from, to, next } => {
                *pages = next;
                effect.gameplan_changed = true;
                effect.step_changed = remap(step, from, to);
            }
            GameplanEdit::Move { from, to } => {
                if from < pages.len() && to < pages.len() && from != to {
                    *pages = move_item(pages, from, to);
                    effect.gameplan_changed = true;
                    effect.step_changed = remap(step, from, to);
                }
            }
        }
        effect
    }
}

fn remap(step: &mut u32, from: usize, to: usize) -> bool {
    let remapped = remap_index(*step as usize, from, to) as u32;
    if remapped == *step {
        return false;
    }
    *step = remapped;
    true
}
