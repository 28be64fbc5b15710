use std::sync::Mutex;

/// Sink for user-facing outcome messages. Fire and forget.
pub trait Notifier: Send + Sync {
    fn report_success(&self, message: &str);

    fn report_error(&self, message: &str);
}

/// Routes notifications to the `log` facade.
#[derive(Default, Clone, Copy, Debug)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn report_success(&self, message: &str) {
        log::info!("{}", message);
    }

    fn report_error(&self, message: &str) {
        log::error!("{}", message);
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Notice {
    Success(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(msg) | Notice::Error(msg) => msg,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

/// Keeps every notification in memory, in order of arrival.
#[derive(Default, Debug)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|n| n.is_error())
            .map(|n| n.message().to_owned())
            .collect()
    }

    pub fn last(&self) -> Option<Notice> {
        self.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notice>> {
        crate::lock(&self.notices)
    }
}

impl Notifier for MemoryNotifier {
    fn report_success(&self, message: &str) {
        self.lock().push(Notice::Success(message.to_owned()));
    }

    fn report_error(&self, message: &str) {
        self.lock().push(Notice::Error(message.to_owned()));
    }
}
