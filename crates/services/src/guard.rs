/// Runs a reset closure when dropped, unless disarmed first.
///
/// Wraps an in-flight flag around an await point: if the awaiting future is
/// dropped before the call returns, the flag is still cleared.
pub(crate) struct ResetOnDrop<F: FnOnce()> {
    reset: Option<F>,
}

impl<F: FnOnce()> ResetOnDrop<F> {
    pub(crate) fn new(reset: F) -> Self {
        Self { reset: Some(reset) }
    }

    /// The call finished normally; the caller clears the flag itself.
    pub(crate) fn disarm(mut self) {
        self.reset = None;
    }
}

impl<F: FnOnce()> Drop for ResetOnDrop<F> {
    fn drop(&mut self) {
        if let Some(reset) = self.reset.take() {
            reset();
        }
    }
}
