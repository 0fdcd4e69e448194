//! Foreground/background state of the hosting page.

use strum_macros::Display;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Publisher side of the visibility channel
#[derive(Debug)]
pub struct PageVisibility {
    tx: watch::Sender<Visibility>,
}

impl PageVisibility {
    pub fn new(initial: Visibility) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, visibility: Visibility) {
        self.tx.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Visibility> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PageVisibility {
    fn default() -> Self {
        Self::new(Visibility::Visible)
    }
}
