use crate::channel::Direction;
use crate::hw::Interrupts;

/// Closure invoked from an interrupt handler with the interrupts it serviced
pub type Callback = Box<dyn FnMut(Interrupts) + Send>;

/// Interrupt callback for one direction of a VDMA core
pub enum Handler {
    /// Called with the pending completion interrupts after a clean frame
    Completion(Callback),
    /// Called with the pending error interrupts; recovering the channel is up to the callback
    Error(Callback),
}

/// Completion and error callbacks of one direction
#[derive(Default)]
pub(crate) struct Callbacks {
    completion: Option<Callback>,
    error: Option<Callback>,
}

impl Callbacks {
    pub fn set(&mut self, handler: Handler) {
        match handler {
            Handler::Completion(f) => self.completion = Some(f),
            Handler::Error(f) => self.error = Some(f),
        }
    }

    /// Routes already cleared interrupts to the registered callbacks
    ///
    /// Nothing is reported unless a completion callback is registered. Errors, and interrupts
    /// without any cause, go to the error callback only.
    pub fn dispatch(&mut self, direction: Direction, pending: Interrupts) {
        let completion = match self.completion.as_mut() {
            Some(f) => f,
            None => return,
        };

        if pending.is_empty() || pending.contains(Interrupts::ERROR) {
            match self.error.as_mut() {
                Some(f) => f(pending & Interrupts::ERROR),
                None => log::warn!("{}: dropped error interrupt {}", direction, pending),
            }
            return;
        }

        completion(pending);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<Interrupts>>>, Callback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |irq| sink.lock().unwrap().push(irq)))
    }

    #[test]
    fn nothing_is_reported_without_a_completion_callback() {
        let (errors, on_error) = recorder();
        let mut callbacks = Callbacks::default();
        callbacks.set(Handler::Error(on_error));

        callbacks.dispatch(Direction::Read, Interrupts::ERROR);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn errors_preempt_completion() {
        let (done, on_done) = recorder();
        let (errors, on_error) = recorder();
        let mut callbacks = Callbacks::default();
        callbacks.set(Handler::Completion(on_done));
        callbacks.set(Handler::Error(on_error));

        callbacks.dispatch(Direction::Write, Interrupts::ERROR | Interrupts::FRAME_COUNT);
        callbacks.dispatch(Direction::Write, Interrupts::empty());
        callbacks.dispatch(Direction::Write, Interrupts::FRAME_COUNT);

        assert_eq!(
            *errors.lock().unwrap(),
            vec![Interrupts::ERROR, Interrupts::empty()]
        );
        assert_eq!(*done.lock().unwrap(), vec![Interrupts::FRAME_COUNT]);
    }

    #[test]
    fn setting_a_callback_replaces_the_previous_one() {
        let (first, on_first) = recorder();
        let (second, on_second) = recorder();
        let mut callbacks = Callbacks::default();
        callbacks.set(Handler::Completion(on_first));
        callbacks.set(Handler::Completion(on_second));

        callbacks.dispatch(Direction::Read, Interrupts::DELAY_COUNT);
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), vec![Interrupts::DELAY_COUNT]);
    }
}
