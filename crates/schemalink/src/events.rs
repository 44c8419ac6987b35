/// Notification emitted by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A synchronization pass finished and the database matches its entities.
    Updated { database: String },
}

impl LinkEvent {
    /// Topic string consumers route on, e.g. `link.main.updated`.
    pub fn topic(&self) -> String {
        match self {
            LinkEvent::Updated { database } => format!("link.{}.updated", database),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic() {
        let event = LinkEvent::Updated {
            database: "main".into(),
        };
        assert_eq!(event.topic(), "link.main.updated");
    }
}
