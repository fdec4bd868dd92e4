//! The operator contract shared by every composed timeline.
//!
//! An operator only answers which child owns a global index, where each
//! child's indices start, and how child uids are named. Window and period
//! lookup, uid resolution, and repeat-mode traversal are written once below
//! in terms of those answers.

use crate::timeline::Timeline;
use crate::uid::Uid;
use crate::window::{Period, RepeatMode, Window};

pub trait Composition {
    fn child_count(&self) -> usize;

    /// Child owning global window `window_index`.
    fn child_index_for_window(&self, window_index: usize) -> usize;

    /// Child owning global period `period_index`.
    fn child_index_for_period(&self, period_index: usize) -> usize;

    /// Child whose uid is `uid`, if any.
    fn child_index_for_uid(&self, uid: &Uid) -> Option<usize>;

    fn first_window_of(&self, child: usize) -> usize;

    fn first_period_of(&self, child: usize) -> usize;

    fn timeline_of(&self, child: usize) -> &Timeline;

    fn uid_of(&self, child: usize) -> Uid;

    /// Name a uid reported by `child` in this timeline's uid space.
    fn wrap_uid(&self, child: usize, uid: Uid) -> Uid {
        Uid::nested(self.uid_of(child), uid)
    }

    /// Inverse of [`wrap_uid`](Self::wrap_uid).
    fn unwrap_uid(&self, uid: &Uid) -> Option<(usize, Uid)> {
        let (outer, inner) = uid.split()?;
        Some((self.child_index_for_uid(outer)?, inner.clone()))
    }

    /// Repeat mode actually applied when traversing this timeline.
    fn effective_repeat_mode(&self, repeat_mode: RepeatMode) -> RepeatMode {
        repeat_mode
    }

    fn adjust_window(&self, _window_index: usize, window: Window) -> Window {
        window
    }

    fn adjust_period(&self, _period_index: usize, period: Period) -> Period {
        period
    }
}

pub(crate) fn window_count<C: Composition + ?Sized>(c: &C) -> usize {
    match c.child_count() {
        0 => 0,
        n => c.first_window_of(n - 1) + c.timeline_of(n - 1).window_count(),
    }
}

pub(crate) fn period_count<C: Composition + ?Sized>(c: &C) -> usize {
    match c.child_count() {
        0 => 0,
        n => c.first_period_of(n - 1) + c.timeline_of(n - 1).period_count(),
    }
}

pub(crate) fn window<C: Composition + ?Sized>(c: &C, window_index: usize) -> Window {
    let child = c.child_index_for_window(window_index);
    let first_period = c.first_period_of(child);
    let mut window = c
        .timeline_of(child)
        .window(window_index - c.first_window_of(child));
    window.uid = c.wrap_uid(child, window.uid);
    window.first_period_index += first_period;
    window.last_period_index += first_period;
    c.adjust_window(window_index, window)
}

pub(crate) fn period<C: Composition + ?Sized>(c: &C, period_index: usize) -> Period {
    let child = c.child_index_for_period(period_index);
    let mut period = c
        .timeline_of(child)
        .period(period_index - c.first_period_of(child));
    period.uid = c.wrap_uid(child, period.uid);
    period.window_index += c.first_window_of(child);
    c.adjust_period(period_index, period)
}

pub(crate) fn index_of_period<C: Composition + ?Sized>(c: &C, uid: &Uid) -> Option<usize> {
    let (child, inner) = c.unwrap_uid(uid)?;
    let index = c.timeline_of(child).index_of_period(&inner)?;
    Some(c.first_period_of(child) + index)
}

pub(crate) fn next_window_index<C: Composition + ?Sized>(
    c: &C,
    window_index: usize,
    repeat_mode: RepeatMode,
) -> Option<usize> {
    let repeat_mode = c.effective_repeat_mode(repeat_mode);
    let child = c.child_index_for_window(window_index);
    let first = c.first_window_of(child);
    let child_mode = match repeat_mode {
        RepeatMode::All => RepeatMode::Off,
        mode => mode,
    };
    if let Some(next) = c
        .timeline_of(child)
        .next_window_index(window_index - first, child_mode)
    {
        return Some(first + next);
    }
    if let Some(next_child) = (child + 1..c.child_count()).find(|&i| !c.timeline_of(i).is_empty()) {
        return Some(c.first_window_of(next_child));
    }
    match repeat_mode {
        RepeatMode::All => (window_count(c) > 0).then_some(0),
        _ => None,
    }
}

pub(crate) fn previous_window_index<C: Composition + ?Sized>(
    c: &C,
    window_index: usize,
    repeat_mode: RepeatMode,
) -> Option<usize> {
    let repeat_mode = c.effective_repeat_mode(repeat_mode);
    let child = c.child_index_for_window(window_index);
    let first = c.first_window_of(child);
    let child_mode = match repeat_mode {
        RepeatMode::All => RepeatMode::Off,
        mode => mode,
    };
    if let Some(previous) = c
        .timeline_of(child)
        .previous_window_index(window_index - first, child_mode)
    {
        return Some(first + previous);
    }
    if let Some(previous_child) = (0..child).rev().find(|&i| !c.timeline_of(i).is_empty()) {
        let timeline = c.timeline_of(previous_child);
        return Some(c.first_window_of(previous_child) + timeline.window_count() - 1);
    }
    match repeat_mode {
        RepeatMode::All => window_count(c).checked_sub(1),
        _ => None,
    }
}
