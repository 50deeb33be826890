//! 会话监管：生成任务的生命周期
//!
//! 同一时刻至多一个生成任务。空闲时持有 SessionState；启动时把状态移入任务并保留
//! CancellationToken 与 JoinHandle，任务结束时交还状态。新任务启动前总是先取消并等待旧任务退出。
//! 任务无论如何结束（正常、取消、出错、panic），GeneratingGuard 都会把快照的 is_generating 复位。
//! 监管者被丢弃时只触发取消，不等待：任务在下一个取消检查点收尾，不再发起新的检索或生成。

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{SessionPublisher, SessionState};
use crate::react::TurnOutcome;

/// 任务交还的状态与结果（失败时为错误信息）
pub type TaskOutput = (SessionState, Result<TurnOutcome, String>);

struct RunningTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<TaskOutput>,
}

pub struct SessionSupervisor {
    /// 任务运行期间为 None（状态在任务内）
    state: Option<SessionState>,
    running: Option<RunningTask>,
    publisher: SessionPublisher,
}

impl SessionSupervisor {
    pub fn new(state: SessionState, publisher: SessionPublisher) -> Self {
        Self {
            state: Some(state),
            running: None,
            publisher,
        }
    }

    /// 是否有尚未退出的生成任务
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// 触发取消并等待任务退出；没有任务时返回 None
    pub async fn cancel(&mut self) -> Option<Result<TurnOutcome, String>> {
        self.retire(true).await
    }

    /// 等待任务自然结束；没有任务时返回 None
    pub async fn wait(&mut self) -> Option<Result<TurnOutcome, String>> {
        self.retire(false).await
    }

    /// 取消当前任务并取回可变状态
    pub async fn reclaim(&mut self) -> &mut SessionState {
        self.retire(true).await;
        let publisher = &self.publisher;
        // 退役途中被中断时状态已随任务丢失，从快照恢复
        self.state
            .get_or_insert_with(|| SessionState::restore(publisher.snapshot().messages))
    }

    /// 取消旧任务 -> prepare 修改状态 -> 把状态移入新任务
    pub async fn start<P, F, Fut>(&mut self, prepare: P, run: F)
    where
        P: FnOnce(&mut SessionState),
        F: FnOnce(SessionState, CancellationToken) -> Fut,
        Fut: Future<Output = TaskOutput> + Send + 'static,
    {
        prepare(self.reclaim().await);
        let state = match self.state.take() {
            Some(state) => state,
            None => self.restore_from_snapshot(),
        };
        self.publisher.publish_transcript(&state);
        self.publisher.set_generating(true);

        let cancel_token = CancellationToken::new();
        let guard = GeneratingGuard {
            publisher: self.publisher.clone(),
        };
        let work = run(state, cancel_token.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            work.await
        });
        self.running = Some(RunningTask {
            cancel_token,
            handle,
        });
    }

    async fn retire(&mut self, cancel: bool) -> Option<Result<TurnOutcome, String>> {
        let task = self.running.take()?;
        if cancel {
            task.cancel_token.cancel();
        }
        let (state, outcome) = match task.handle.await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, "generation task aborted");
                let message = format!("Generation task failed: {e}");
                self.publisher.set_error(Some(message.clone()));
                (self.restore_from_snapshot(), Err(message))
            }
        };
        self.state = Some(state);
        Some(outcome)
    }

    fn restore_from_snapshot(&self) -> SessionState {
        SessionState::restore(self.publisher.snapshot().messages)
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.running.take() {
            tracing::debug!("session dropped, cancelling generation task");
            task.cancel_token.cancel();
        }
    }
}

/// 任务结束（含 panic 展开）时复位 is_generating
struct GeneratingGuard {
    publisher: SessionPublisher,
}

impl Drop for GeneratingGuard {
    fn drop(&mut self) {
        self.publisher.set_generating(false);
    }
}
