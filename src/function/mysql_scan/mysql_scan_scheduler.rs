use parking_lot::Mutex;

use crate::error::Result;
use crate::function::mysql_scan::mysql_scan_global_init::mysql_scan_global_init;
use crate::function::mysql_scan::mysql_scan_local_init::{mysql_scan_local_init, ScanRequest};
use crate::function::mysql_scan::mysql_scan_read::mysql_scan_read;
use crate::model::mysql_bind_data::MysqlBindData;
use crate::model::mysql_global_state::MysqlGlobalState;
use crate::model::mysql_local_state::MysqlLocalState;
use crate::model::output_chunk::OutputChunk;

#[derive(Debug, Default)]
struct TaskQueue {
    /// Started tasks waiting for their next batch
    parked: Vec<MysqlLocalState>,
    /// Tasks started and not yet done, parked or running
    live: usize,
    /// A fresh task found no pages left
    exhausted: bool,
}

enum NextTask {
    Resume(MysqlLocalState),
    Start,
    Finished,
}

/**
Hands scan tasks to whichever worker thread asks for the next batch.

The host calls [`MysqlScanScheduler::next_chunk`] from any number of threads.
A task that still has rows is parked between batches and resumed by the next
caller, so a task is never tied to the thread that started it. At most
`max_threads` tasks are live at once, which keeps connection use within the
pool bound. A call that returns 0 rows means this caller has nothing left to do.
 */
#[derive(Debug)]
pub struct MysqlScanScheduler {
    global_state: MysqlGlobalState,
    request: ScanRequest,
    max_tasks: usize,
    tasks: Mutex<TaskQueue>,
}

impl MysqlScanScheduler {
    pub fn new(bind_data: &MysqlBindData, request: ScanRequest) -> Self {
        let global_state = mysql_scan_global_init(bind_data);
        let max_tasks = usize::try_from(global_state.max_threads()).unwrap_or(usize::MAX).max(1);
        Self {
            global_state,
            request,
            max_tasks,
            tasks: Mutex::new(TaskQueue::default()),
        }
    }

    pub fn global_state(&self) -> &MysqlGlobalState {
        &self.global_state
    }

    pub fn max_threads(&self) -> u64 {
        self.global_state.max_threads()
    }

    /// Tasks waiting to be resumed
    pub fn parked(&self) -> usize {
        self.tasks.lock().parked.len()
    }

    /// Tasks started and not yet done
    pub fn live(&self) -> usize {
        self.tasks.lock().live
    }

    fn next_task(&self) -> NextTask {
        let mut queue = self.tasks.lock();
        if let Some(task) = queue.parked.pop() {
            return NextTask::Resume(task);
        }
        if !queue.exhausted && queue.live < self.max_tasks {
            queue.live += 1;
            return NextTask::Start;
        }
        NextTask::Finished
    }

    fn park(&self, task: MysqlLocalState) {
        self.tasks.lock().parked.push(task);
    }

    fn retire(&self, task: Option<MysqlLocalState>, exhausted: bool) {
        // the task releases its connection before the slot frees up
        drop(task);
        let mut queue = self.tasks.lock();
        queue.live = queue.live.saturating_sub(1);
        queue.exhausted |= exhausted;
    }

    /// Fill `output` with the next batch of any live task.
    pub fn next_chunk(&self, bind_data: &MysqlBindData, output: &mut dyn OutputChunk) -> Result<usize> {
        loop {
            let mut task = match self.next_task() {
                NextTask::Resume(task) => task,
                NextTask::Start => match mysql_scan_local_init(bind_data, &self.global_state, self.request.clone()) {
                    Ok(task) if task.done => {
                        // a parked task may still hold rows, look again
                        self.retire(Some(task), true);
                        continue;
                    }
                    Ok(task) => task,
                    Err(e) => {
                        self.retire(None, false);
                        return Err(e);
                    }
                },
                NextTask::Finished => {
                    output.set_len(0);
                    return Ok(0);
                }
            };

            match mysql_scan_read(bind_data, &self.global_state, &mut task, output) {
                Ok(rows) => {
                    if task.done {
                        self.retire(Some(task), false);
                    } else {
                        self.park(task);
                    }
                    if rows > 0 {
                        return Ok(rows);
                    }
                }
                Err(e) => {
                    self.retire(Some(task), false);
                    return Err(e);
                }
            }
        }
    }
}
