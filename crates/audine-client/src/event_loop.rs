//! 事件循环线程
//!
//! 单线程串行处理命令、链路事件、节拍和闹钟，编排器本身不需要任何锁。
//! 闹钟由编排器的 [`Timers`](crate::timer::Timers) 描述，循环在每个事件
//! 之后比对令牌，必要时用 `crossbeam_channel::after` 重新布防。

use crate::ClientError;
use crate::controller::{CameraController, Command, Event, Notification};
use crate::link::{HardwareLink, LinkEvent};
use crate::timer::{AlarmToken, TICK_INTERVAL};
use crossbeam_channel::{Receiver, Sender, after, never, select, tick, unbounded};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// 事件循环
pub struct EventLoop;

impl EventLoop {
    /// 在独立线程中运行编排器
    pub fn spawn<L>(
        controller: CameraController<L>,
        link_events: Receiver<LinkEvent>,
    ) -> Result<EventLoopHandle<L>, ClientError>
    where
        L: HardwareLink + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = unbounded();
        let (note_tx, note_rx) = unbounded();
        let thread = thread::Builder::new()
            .name("audine-loop".into())
            .spawn(move || run(controller, cmd_rx, link_events, note_tx))?;
        Ok(EventLoopHandle {
            commands: Some(cmd_tx),
            notifications: note_rx,
            thread: Some(thread),
        })
    }
}

/// 事件循环句柄
pub struct EventLoopHandle<L: HardwareLink> {
    commands: Option<Sender<Command>>,
    notifications: Receiver<Notification>,
    thread: Option<JoinHandle<CameraController<L>>>,
}

impl<L: HardwareLink> EventLoopHandle<L> {
    /// 投递命令（结果以 [`Notification::Command`] 返回）
    pub fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .as_ref()
            .ok_or(ClientError::LoopStopped)?
            .send(command)
            .map_err(|_| ClientError::LoopStopped)
    }

    /// 通知接收端
    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    /// 停止事件循环并取回编排器
    pub fn shutdown(mut self) -> Result<CameraController<L>, ClientError> {
        self.commands.take();
        let thread = self.thread.take().ok_or(ClientError::LoopStopped)?;
        thread.join().map_err(|_| ClientError::ThreadPanicked)
    }
}

impl<L: HardwareLink> Drop for EventLoopHandle<L> {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Event loop thread panicked");
        }
    }
}

enum Wake {
    Event(Event),
    Alarm,
    LinkClosed,
    Stop,
}

fn run<L: HardwareLink>(
    mut controller: CameraController<L>,
    commands: Receiver<Command>,
    mut link_events: Receiver<LinkEvent>,
    notifications: Sender<Notification>,
) -> CameraController<L> {
    let ticker = tick(TICK_INTERVAL);
    let mut alarm: Receiver<Instant> = never();
    let mut alarm_token: Option<AlarmToken> = None;

    debug!("Event loop started");
    loop {
        let wake = select! {
            recv(commands) -> msg => match msg {
                Ok(command) => Wake::Event(Event::Command(command)),
                Err(_) => Wake::Stop,
            },
            recv(link_events) -> msg => match msg {
                Ok(event) => Wake::Event(Event::Link(event)),
                Err(_) => Wake::LinkClosed,
            },
            recv(ticker) -> _ => Wake::Event(Event::Tick),
            recv(alarm) -> _ => Wake::Alarm,
        };

        let event = match wake {
            Wake::Event(event) => event,
            Wake::Stop => break,
            Wake::LinkClosed => {
                trace!("Link event channel closed");
                link_events = never();
                continue;
            },
            Wake::Alarm => {
                alarm = never();
                match alarm_token.take() {
                    Some(token) => Event::Alarm(token),
                    None => continue,
                }
            },
        };

        for note in controller.handle(event) {
            if notifications.send(note).is_err() {
                trace!("Notification receiver dropped");
            }
        }

        // 闹钟随编排器的布防状态重建
        let armed = controller.timers().armed();
        if armed.map(|a| a.token) != alarm_token {
            alarm_token = armed.map(|a| a.token);
            alarm = match armed {
                Some(a) => after(a.duration),
                None => never(),
            };
        }
    }
    debug!("Event loop stopped");
    controller
}
