//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use backpressure_viz::pipeline::{Consume, FlowController, Produce, Work};
use backpressure_viz::{PipeEvent, RunReport};
use std::collections::VecDeque;

/// Position of the first event matching `pred`, panicking with the event log otherwise.
pub fn position_of(report: &RunReport, pred: impl Fn(&PipeEvent) -> bool) -> usize {
    report
        .events
        .iter()
        .position(|e| pred(&e.event))
        .unwrap_or_else(|| panic!("event not found in {:?}", report.event_kinds()))
}

/// Drive a controller without a runtime. `pick` chooses which queued work
/// item completes next, given the queue length.
pub fn drive<P, C>(
    ctl: &mut FlowController<P, C>,
    mut pick: impl FnMut(&VecDeque<Work>) -> usize,
) -> Vec<PipeEvent>
where
    P: Produce,
    C: Consume,
{
    let mut queue = VecDeque::new();
    let mut events = Vec::new();
    ctl.start();
    loop {
        queue.extend(ctl.take_work());
        events.extend(ctl.take_events());
        if queue.is_empty() {
            break;
        }
        let index = pick(&queue).min(queue.len() - 1);
        match queue.remove(index) {
            Some(Work::Generate(generation)) => ctl.on_generated(generation),
            Some(Work::Consume(_)) => ctl.on_processed(),
            None => break,
        }
    }
    events
}

/// Pick the first pending generation, falling back to the oldest work item.
pub fn prefer_generate(queue: &VecDeque<Work>) -> usize {
    queue
        .iter()
        .position(|w| matches!(w, Work::Generate(_)))
        .unwrap_or(0)
}
