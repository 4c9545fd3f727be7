//! Operation dispatch.
//!
//! Every command becomes its own unit of work. In threaded mode each unit gets
//! a dedicated OS thread and all of them race for the [`Directory`] lock; the
//! only ordering between units is what the lock's mutual exclusion provides.
//! A unit whose thread cannot be created runs inline on the dispatching thread
//! through the same code path, so no command is ever dropped.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::{
    commands::{Command, CommandKind},
    events::EventSink,
    guard::Directory,
    key::name_key,
    results::ResultSink,
    store::{Record, Upsert},
};

/// How units of work are launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One thread per command, joined at the end.
    #[default]
    Threaded,
    /// Every command runs on the dispatching thread in file order.
    Serial,
}

/// What a single command did. `Display` renders the console line(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inserted { name: String, key: u32, salary: u32 },
    Updated { key: u32, previous: u32, salary: u32 },
    Deleted { name: String, key: u32 },
    DeleteMissed { name: String },
    Found(Record),
    NotFound { name: String },
    Printed(Vec<Record>),
    Failed { name: String, error: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Inserted { name, key, salary } => {
                write!(f, "Inserted {} with hash {} salary {}", name, key, salary)
            }
            Outcome::Updated {
                key,
                previous,
                salary,
            } => write!(f, "Updated record {} from {} to {}", key, previous, salary),
            Outcome::Deleted { name, key } => {
                write!(f, "Deleted record for {} (hash {})", name, key)
            }
            Outcome::DeleteMissed { name } => write!(f, "No record found for {}", name),
            Outcome::Found(record) => write!(f, "Found: {}", record),
            Outcome::NotFound { .. } => f.write_str("No Record Found"),
            Outcome::Printed(records) => {
                f.write_str("Current Database:")?;
                if records.is_empty() {
                    return f.write_str("\n(empty)");
                }
                for record in records {
                    write!(f, "\n{}", record)?;
                }
                Ok(())
            }
            Outcome::Failed { name, error } => {
                write!(f, "Failed to insert {}: {}", name, error)
            }
        }
    }
}

pub type Job = Box<dyn FnOnce() -> Outcome + Send + 'static>;

/// Launches a unit of work on its own thread of execution.
pub trait Spawner: Send + Sync {
    fn spawn(&self, name: String, job: Job) -> io::Result<JoinHandle<Outcome>>;
}

/// Spawns one named OS thread per job.
#[derive(Debug, Clone, Default)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    pub fn with_stack_size(stack_size: usize) -> Self {
        Self {
            stack_size: Some(stack_size),
        }
    }
}

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: String, job: Job) -> io::Result<JoinHandle<Outcome>> {
        let mut builder = thread::Builder::new().name(name);
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder.spawn(job)
    }
}

/// Summary of one [`Dispatcher::run`].
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Outcomes by input position; `None` where the worker panicked.
    pub outcomes: Vec<Option<Outcome>>,
    pub spawned: usize,
    pub inline: usize,
    pub panicked: usize,
}

impl DispatchReport {
    pub fn outcome(&self, index: usize) -> Option<&Outcome> {
        self.outcomes.get(index)?.as_ref()
    }

    pub fn failed(&self) -> usize {
        let failed = self
            .outcomes
            .iter()
            .flatten()
            .filter(|outcome| matches!(outcome, Outcome::Failed { .. }))
            .count();
        failed + self.panicked
    }
}

/// Runs commands against a shared [`Directory`].
#[derive(Clone)]
pub struct Dispatcher {
    directory: Arc<Directory>,
    events: Arc<dyn EventSink>,
    results: Arc<dyn ResultSink>,
    mode: DispatchMode,
    spawner: Arc<dyn Spawner>,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<Directory>,
        events: Arc<dyn EventSink>,
        results: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            directory,
            events,
            results,
            mode: DispatchMode::default(),
            spawner: Arc::new(ThreadSpawner::default()),
        }
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Launch one unit per command and wait for all of them.
    pub fn run(&self, commands: Vec<Command>) -> DispatchReport {
        let mut report = DispatchReport {
            outcomes: (0..commands.len()).map(|_| None).collect(),
            ..DispatchReport::default()
        };

        if self.mode == DispatchMode::Serial {
            for (index, command) in commands.iter().enumerate() {
                report.outcomes[index] = Some(self.process(command));
                report.inline += 1;
            }
            return report;
        }

        let mut handles = Vec::with_capacity(commands.len());
        for (index, command) in commands.into_iter().enumerate() {
            let worker = self.clone();
            let job_command = command.clone();
            let name = format!("{}-{}", command.verb().to_ascii_lowercase(), command.priority);

            match self
                .spawner
                .spawn(name, Box::new(move || worker.process(&job_command)))
            {
                Ok(handle) => {
                    handles.push((index, handle));
                    report.spawned += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to create thread for command {}, executing synchronously: {}",
                        index, e
                    );
                    report.outcomes[index] = Some(self.process(&command));
                    report.inline += 1;
                }
            }
        }

        for (index, handle) in handles {
            match handle.join() {
                Ok(outcome) => report.outcomes[index] = Some(outcome),
                Err(_) => {
                    error!("Worker for command {} panicked", index);
                    report.panicked += 1;
                }
            }
        }
        report
    }

    /// Execute one command and echo its outcome to the console.
    fn process(&self, command: &Command) -> Outcome {
        let outcome = self.execute(command);
        match &outcome {
            Outcome::Failed { .. } => {
                // Reported even when diagnostic logging is filtered out.
                eprintln!("{}", outcome);
                error!(priority = command.priority, "{}", outcome);
            }
            _ => println!("{}", outcome),
        }
        outcome
    }

    /// Execute one command against the directory.
    ///
    /// The command event is logged before the lock is requested, and the lock is
    /// released before anything is written to the result sink.
    #[instrument(skip(self, command), fields(op = command.verb(), priority = command.priority))]
    pub fn execute(&self, command: &Command) -> Outcome {
        let priority = command.priority;
        let outcome = match &command.kind {
            CommandKind::Insert { name, salary } => self.insert(priority, name, *salary),
            CommandKind::Delete { name } => self.delete(priority, name),
            CommandKind::Search { name } => self.search(priority, name),
            CommandKind::Print => self.print(priority),
        };
        debug!(?outcome, "Command finished");
        outcome
    }

    fn insert(&self, priority: u32, name: &str, salary: u32) -> Outcome {
        let key = name_key(name);
        self.events
            .log_command(priority, &format!("INSERT,{},{},{}", key, name, salary));

        let result = self.directory.write(self.events.as_ref(), priority, |store| {
            store.insert_or_update(name, salary, key)
        });

        match result {
            Ok(Upsert::Inserted) => Outcome::Inserted {
                name: name.to_string(),
                key,
                salary,
            },
            Ok(Upsert::Updated { previous }) => Outcome::Updated {
                key,
                previous,
                salary,
            },
            Err(e) => Outcome::Failed {
                name: name.to_string(),
                error: e.to_string(),
            },
        }
    }

    fn delete(&self, priority: u32, name: &str) -> Outcome {
        let key = name_key(name);
        self.events
            .log_command(priority, &format!("DELETE,{},{}", key, name));

        let removed = self.directory.write(self.events.as_ref(), priority, |store| {
            store.delete(name, key)
        });

        match removed {
            Some(_) => Outcome::Deleted {
                name: name.to_string(),
                key,
            },
            None => Outcome::DeleteMissed {
                name: name.to_string(),
            },
        }
    }

    fn search(&self, priority: u32, name: &str) -> Outcome {
        let key = name_key(name);
        self.events
            .log_command(priority, &format!("SEARCH,{},{}", key, name));

        let found = self
            .directory
            .read(self.events.as_ref(), priority, |store| store.find(name));

        match found {
            Some(record) => {
                self.results.appendf(format_args!("Found: {}\n", record));
                Outcome::Found(record)
            }
            None => {
                self.results
                    .appendf(format_args!("No Record Found for {}\n", name));
                Outcome::NotFound {
                    name: name.to_string(),
                }
            }
        }
    }

    fn print(&self, priority: u32) -> Outcome {
        self.events.log_command(priority, "PRINT");

        let records = self
            .directory
            .read(self.events.as_ref(), priority, |store| store.snapshot());

        self.results.append("Current Database:\n");
        if records.is_empty() {
            self.results.append("(empty)\n");
        }
        for record in &records {
            self.results.appendf(format_args!("{}\n", record));
        }
        Outcome::Printed(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::results::ResultLog;
    use tracing_test::traced_test;

    struct Fixture {
        events: Arc<EventLog<Vec<u8>>>,
        results: Arc<ResultLog<Vec<u8>>>,
        dispatcher: Dispatcher,
    }

    fn fixture(mode: DispatchMode) -> Fixture {
        let events = Arc::new(EventLog::in_memory());
        let results = Arc::new(ResultLog::in_memory());
        let dispatcher = Dispatcher::new(
            Arc::new(Directory::new()),
            events.clone(),
            results.clone(),
        )
        .with_mode(mode);
        Fixture {
            events,
            results,
            dispatcher,
        }
    }

    /// Refuses every launch so all work falls back to the dispatching thread.
    struct RefusingSpawner;

    impl Spawner for RefusingSpawner {
        fn spawn(&self, _name: String, _job: Job) -> io::Result<JoinHandle<Outcome>> {
            Err(io::Error::new(io::ErrorKind::OutOfMemory, "no threads left"))
        }
    }

    #[test]
    fn test_insert_search_delete_search() {
        let fx = fixture(DispatchMode::Serial);
        let report = fx.dispatcher.run(vec![
            Command::insert("alice", 1000, 1),
            Command::search("alice", 2),
            Command::delete("alice", 3),
            Command::search("alice", 4),
        ]);

        let key = name_key("alice");
        assert_eq!(
            report.outcome(0),
            Some(&Outcome::Inserted {
                name: "alice".into(),
                key,
                salary: 1000
            })
        );
        assert_eq!(
            report.outcome(1),
            Some(&Outcome::Found(Record::new(key, "alice", 1000)))
        );
        assert_eq!(
            report.outcome(2),
            Some(&Outcome::Deleted {
                name: "alice".into(),
                key
            })
        );
        assert_eq!(
            report.outcome(3),
            Some(&Outcome::NotFound {
                name: "alice".into()
            })
        );
        assert_eq!(
            fx.results.contents(),
            format!("Found: {key},alice,1000\nNo Record Found for alice\n")
        );
        assert_eq!(report.inline, 4);
        assert_eq!(report.spawned, 0);
    }

    #[test]
    fn test_second_insert_updates() {
        let fx = fixture(DispatchMode::Serial);
        let report = fx.dispatcher.run(vec![
            Command::insert("bob", 500, 1),
            Command::insert("bob", 700, 2),
            Command::print(3),
        ]);

        let key = name_key("bob");
        assert_eq!(
            report.outcome(1),
            Some(&Outcome::Updated {
                key,
                previous: 500,
                salary: 700
            })
        );
        assert_eq!(
            report.outcome(2),
            Some(&Outcome::Printed(vec![Record::new(key, "bob", 700)]))
        );
        assert_eq!(
            fx.results.contents(),
            format!("Current Database:\n{key},bob,700\n")
        );
    }

    #[test]
    fn test_print_empty_directory() {
        let fx = fixture(DispatchMode::Serial);
        let report = fx.dispatcher.run(vec![Command::print(1)]);

        let outcome = report.outcome(0).unwrap();
        assert_eq!(outcome.to_string(), "Current Database:\n(empty)");
        assert_eq!(fx.results.contents(), "Current Database:\n(empty)\n");
    }

    #[test]
    fn test_delete_missing_is_not_an_error() {
        let fx = fixture(DispatchMode::Serial);
        let report = fx.dispatcher.run(vec![Command::delete("ghost", 1)]);

        let outcome = report.outcome(0).unwrap();
        assert_eq!(outcome.to_string(), "No record found for ghost");
        assert_eq!(report.failed(), 0);
        // Delete results only go to the console.
        assert_eq!(fx.results.contents(), "");
    }

    #[test]
    fn test_command_event_precedes_lock_events() {
        let fx = fixture(DispatchMode::Serial);
        fx.dispatcher.run(vec![Command::insert("alice", 1000, 5)]);

        let contents = fx.events.contents();
        let lines: Vec<&str> = contents
            .lines()
            .map(|line| line.split_once(',').unwrap().1)
            .collect();
        let key = name_key("alice");
        assert_eq!(
            lines,
            [
                format!("THREAD 5,INSERT,{key},alice,1000").as_str(),
                "THREAD 5WAITING FOR MY TURN",
                "THREAD 5AWAKENED FOR WORK",
                "THREAD 5WRITE LOCK ACQUIRED",
                "THREAD 5WRITE LOCK RELEASED",
            ]
        );
    }

    #[test]
    fn test_outcome_console_lines() {
        let record = Record::new(7, "carol", 30);
        assert_eq!(
            Outcome::Inserted {
                name: "carol".into(),
                key: 7,
                salary: 30
            }
            .to_string(),
            "Inserted carol with hash 7 salary 30"
        );
        assert_eq!(
            Outcome::Updated {
                key: 7,
                previous: 30,
                salary: 40
            }
            .to_string(),
            "Updated record 7 from 30 to 40"
        );
        assert_eq!(
            Outcome::Deleted {
                name: "carol".into(),
                key: 7
            }
            .to_string(),
            "Deleted record for carol (hash 7)"
        );
        assert_eq!(Outcome::Found(record.clone()).to_string(), "Found: 7,carol,30");
        assert_eq!(
            Outcome::Printed(vec![record.clone(), Record::new(9, "dave", 1)]).to_string(),
            "Current Database:\n7,carol,30\n9,dave,1"
        );
    }

    #[test]
    #[traced_test]
    fn test_failed_insert_leaves_other_commands_alone() {
        let fx = fixture(DispatchMode::Serial);
        let long = "x".repeat(51);
        let report = fx.dispatcher.run(vec![
            Command::insert(long.as_str(), 1, 1),
            Command::insert("ok", 2, 2),
        ]);

        assert!(matches!(report.outcome(0), Some(Outcome::Failed { name, .. }) if *name == long));
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.outcome(1),
            Some(&Outcome::Inserted {
                name: "ok".into(),
                key: name_key("ok"),
                salary: 2
            })
        );
        assert_eq!(fx.results.contents(), "");
        assert!(logs_contain("Failed to insert"));

        let count = fx
            .dispatcher
            .directory()
            .read(fx.events.as_ref(), 0, |store| store.verify())
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    #[traced_test]
    fn test_refused_spawn_runs_inline() {
        let fx = fixture(DispatchMode::Threaded);
        let dispatcher = fx.dispatcher.clone().with_spawner(Arc::new(RefusingSpawner));

        let report = dispatcher.run(vec![
            Command::insert("alice", 1000, 1),
            Command::search("alice", 2),
        ]);

        assert_eq!(report.spawned, 0);
        assert_eq!(report.inline, 2);
        assert_eq!(
            report.outcome(1),
            Some(&Outcome::Found(Record::new(name_key("alice"), "alice", 1000)))
        );
        assert!(logs_contain("executing synchronously"));
    }

    #[test]
    fn test_threaded_run_joins_every_worker() {
        let fx = fixture(DispatchMode::Threaded);
        let commands: Vec<Command> = (0..64)
            .map(|i| Command::insert(format!("emp{i}"), i, i))
            .collect();

        let report = fx.dispatcher.run(commands);

        assert_eq!(report.spawned, 64);
        assert_eq!(report.panicked, 0);
        assert!(report.outcomes.iter().all(Option::is_some));
        let count = fx
            .dispatcher
            .directory()
            .read(fx.events.as_ref(), 0, |store| store.verify())
            .unwrap();
        assert_eq!(count, 64);
    }
}
