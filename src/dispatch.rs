//! Run independent jobs on a fixed set of worker threads.

use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use miette::miette;
use tracing::debug;

use crate::result::Result;

/// A worker pulling jobs until the job channel is closed.
struct Worker<'f, T, R> {
    id: usize,
    job: &'f (dyn Fn(&T) -> R + Sync),
    receive_channel: Receiver<(usize, &'f T)>,
    send_channel: Sender<(usize, R)>,
}

impl<T, R> Worker<'_, T, R> {
    fn run(self) {
        debug!("Worker {} started", self.id);
        for (idx, input) in self.receive_channel {
            let output = (self.job)(input);
            if self.send_channel.send((idx, output)).is_err() {
                break;
            }
        }
        debug!("Worker {} stopped", self.id);
    }
}

/// Apply `job` to every input on at most `workers` threads.
///
/// Outputs are returned in input order, whatever order the jobs finished in.
pub fn dispatch<T, R, F>(inputs: &[T], workers: usize, job: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.clamp(1, inputs.len().max(1));
    let (send, receive) = bounded(workers);
    let (result_send, results) = unbounded();

    thread::scope(|scope| -> Result<()> {
        for id in 0..workers {
            let worker = Worker {
                id,
                job: &job,
                receive_channel: receive.clone(),
                send_channel: result_send.clone(),
            };
            thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn_scoped(scope, move || worker.run())?;
        }

        // Fill the job channel, blocking while every worker is busy
        for item in inputs.iter().enumerate() {
            send.send(item)
                .map_err(|_| miette!("Every worker stopped before all jobs were sent"))?;
        }

        // Drop the sender to indicate the end of the input data
        drop(send);
        Ok(())
    })?;
    drop(result_send);

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(inputs.len()).collect();
    for (idx, output) in results {
        slots[idx] = Some(output);
    }
    slots
        .into_iter()
        .collect::<Option<Vec<R>>>()
        .ok_or_else(|| miette!("A job ended without an output").into())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::Mutex,
        time::Duration,
    };

    use super::*;

    #[test]
    fn outputs_keep_the_input_order() {
        let inputs: Vec<u64> = (0..20).collect();
        // Early jobs sleep longer so they finish last
        let outputs = dispatch(&inputs, 4, |&n| {
            thread::sleep(Duration::from_millis(20 - n));
            n * 10
        })
        .unwrap();
        assert_eq!(outputs, (0..20).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[test]
    fn jobs_run_on_named_workers() {
        let names = Mutex::new(HashSet::new());
        dispatch(&[(); 16], 3, |_| {
            let name = thread::current().name().unwrap_or_default().to_owned();
            names.lock().unwrap().insert(name);
            thread::sleep(Duration::from_millis(5));
        })
        .unwrap();

        let names = names.into_inner().unwrap();
        assert!(!names.is_empty() && names.len() <= 3);
        assert!(names.iter().all(|name| name.starts_with("worker-")));
    }

    #[test]
    fn nothing_to_do() {
        let outputs = dispatch(&[] as &[u8], 8, |&n| n).unwrap();
        assert!(outputs.is_empty());
    }
}
