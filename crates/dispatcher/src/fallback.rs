use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use metrics::counter;
use sms_domain::{FallbackState, MessageId, MessageKind, MessagePart, MessageRef};
use tracing::{debug, info};

/// 回退重发所需的原始内容
#[derive(Debug, Clone)]
pub enum FallbackPayload {
    /// 仍在等待 IP 通道结果的短信分段
    Sms {
        destination: String,
        sc_address: Option<String>,
        parts: Vec<MessagePart>,
    },
    Mms {
        pdu: Vec<u8>,
        location_url: Option<String>,
    },
}

impl FallbackPayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            FallbackPayload::Sms { .. } => MessageKind::Sms,
            FallbackPayload::Mms { .. } => MessageKind::Mms,
        }
    }
}

/// 一条经 IP 通道发出的消息及其回退状态
#[derive(Debug, Clone)]
pub struct FallbackEntry {
    pub message_ref: MessageRef,
    pub message_id: MessageId,
    pub payload: FallbackPayload,
    pub state: FallbackState,
}

/// `report_outcome` 的判定结果，实际的重发由调度器执行
#[derive(Debug, Clone)]
pub enum FallbackDecision {
    /// 未知引用、种类不符或重复报告
    Ignored,
    Succeeded(FallbackEntry),
    Resend(FallbackEntry),
}

#[derive(Debug)]
struct Registry {
    entries: HashMap<MessageRef, FallbackEntry>,
    next_ref: i32,
}

/// IP 到电路域的回退状态机
///
/// ```text
/// AwaitingIpResult --成功--> IpSucceeded --> Terminal
/// AwaitingIpResult --失败--> IpFailedAwaitingResend --重发--> ResentViaCircuit --> Terminal
/// ```
///
/// 状态判定在同一把锁内完成，同一引用最多触发一次重发。
/// 短信与彩信共用一个引用号空间。进入 Terminal 的条目保留到对应跟踪上下文回收为止。
#[derive(Debug)]
pub struct TransportFallbackStateMachine {
    registry: Mutex<Registry>,
}

impl TransportFallbackStateMachine {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                entries: HashMap::new(),
                next_ref: 1,
            }),
        }
    }

    /// 分配消息引用号并登记为 AwaitingIpResult，跳过仍然存活的引用号
    pub fn register(&self, message_id: MessageId, payload: FallbackPayload) -> MessageRef {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);

        let mut candidate = registry.next_ref;
        while registry.entries.contains_key(&MessageRef(candidate)) {
            candidate = Self::following(candidate);
        }
        registry.next_ref = Self::following(candidate);

        let message_ref = MessageRef(candidate);
        let kind = payload.kind();
        registry.entries.insert(
            message_ref,
            FallbackEntry {
                message_ref,
                message_id,
                payload,
                state: FallbackState::AwaitingIpResult,
            },
        );
        debug!(
            "{} 消息 {} 分配引用号 {}，等待 IP 通道结果",
            kind.as_str(),
            message_id,
            message_ref
        );
        message_ref
    }

    pub fn report_outcome(
        &self,
        kind: MessageKind,
        message_ref: MessageRef,
        success: bool,
    ) -> FallbackDecision {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = registry
            .entries
            .get_mut(&message_ref)
            .filter(|entry| entry.payload.kind() == kind)
        else {
            debug!(
                "引用号 {} 没有存活的 {} 回退状态，忽略结果报告",
                message_ref,
                kind.as_str()
            );
            counter!("sms_stale_signals_total", "signal" => "fallback").increment(1);
            return FallbackDecision::Ignored;
        };

        if entry.state != FallbackState::AwaitingIpResult {
            debug!(
                "引用号 {} 当前状态为 {:?}，忽略重复的结果报告",
                message_ref, entry.state
            );
            return FallbackDecision::Ignored;
        }

        if success {
            entry.state = FallbackState::IpSucceeded;
            let decision = FallbackDecision::Succeeded(entry.clone());
            entry.state = FallbackState::Terminal;
            info!("引用号 {} 经 IP 通道发送成功", message_ref);
            decision
        } else {
            entry.state = FallbackState::IpFailedAwaitingResend;
            info!("引用号 {} 经 IP 通道发送失败，准备经电路域重发", message_ref);
            FallbackDecision::Resend(entry.clone())
        }
    }

    /// 调度器完成电路域重发后调用
    pub fn mark_resent(&self, message_ref: MessageRef) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = registry.entries.get_mut(&message_ref) {
            if entry.state == FallbackState::IpFailedAwaitingResend {
                entry.state = FallbackState::ResentViaCircuit;
                debug!("引用号 {} 已经电路域重发", message_ref);
                entry.state = FallbackState::Terminal;
            }
        }
    }

    /// IP 通道未能受理的分段已直接改走电路域，不再等待运营商报告
    ///
    /// 条目中没有剩余内容时直接进入 Terminal，返回更新后的状态。
    pub fn detach_parts(&self, message_ref: MessageRef, indices: &[usize]) -> Option<FallbackState> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = registry.entries.get_mut(&message_ref)?;
        if entry.state != FallbackState::AwaitingIpResult {
            return Some(entry.state);
        }

        let exhausted = match &mut entry.payload {
            FallbackPayload::Sms { parts, .. } => {
                parts.retain(|part| !indices.contains(&part.index));
                parts.is_empty()
            }
            FallbackPayload::Mms { .. } => indices.contains(&0),
        };
        if exhausted {
            entry.state = FallbackState::ResentViaCircuit;
            debug!("引用号 {} 的内容已全部改走电路域", message_ref);
            entry.state = FallbackState::Terminal;
        }
        Some(entry.state)
    }

    pub fn state(&self, message_ref: MessageRef) -> Option<FallbackState> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&message_ref)
            .map(|entry| entry.state)
    }

    /// 移除跟踪上下文已不存在的条目，返回移除数量
    pub fn retire_untracked<F>(&self, is_tracked: F) -> usize
    where
        F: Fn(MessageId) -> bool,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.entries.len();
        registry
            .entries
            .retain(|_, entry| is_tracked(entry.message_id));
        let removed = before - registry.entries.len();
        if removed > 0 {
            debug!("回收了 {} 个回退状态", removed);
        }
        removed
    }

    pub fn live_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn following(message_ref: i32) -> i32 {
        if message_ref == i32::MAX {
            1
        } else {
            message_ref + 1
        }
    }
}

impl Default for TransportFallbackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sms_domain::Encoding;

    fn part(index: usize) -> MessagePart {
        MessagePart {
            index,
            total: 2,
            encoding: Encoding::Gsm7,
            text: Some("hi".to_string()),
            payload: vec![0x68, 0x69],
            destination_port: None,
        }
    }

    fn register(machine: &TransportFallbackStateMachine) -> (MessageId, MessageRef) {
        let id = MessageId::new();
        let payload = FallbackPayload::Sms {
            destination: "10086".to_string(),
            sc_address: None,
            parts: vec![part(0), part(1)],
        };
        (id, machine.register(id, payload))
    }

    #[test]
    fn test_refs_are_sequential_and_skip_live() {
        let machine = TransportFallbackStateMachine::new();
        let (_, first) = register(&machine);
        let (_, second) = register(&machine);
        assert_eq!(first, MessageRef(1));
        assert_eq!(second, MessageRef(2));

        machine.registry.lock().unwrap().next_ref = 1;
        let (_, third) = register(&machine);
        assert_eq!(third, MessageRef(3));
    }

    #[test]
    fn test_success_path() {
        let machine = TransportFallbackStateMachine::new();
        let (id, message_ref) = register(&machine);

        match machine.report_outcome(MessageKind::Sms, message_ref, true) {
            FallbackDecision::Succeeded(entry) => {
                assert_eq!(entry.message_id, id);
                assert_eq!(entry.state, FallbackState::IpSucceeded);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
        assert_eq!(machine.state(message_ref), Some(FallbackState::Terminal));
        assert!(matches!(
            machine.report_outcome(MessageKind::Sms, message_ref, false),
            FallbackDecision::Ignored
        ));
    }

    #[test]
    fn test_failure_then_resend() {
        let machine = TransportFallbackStateMachine::new();
        let (_, message_ref) = register(&machine);

        assert!(matches!(
            machine.report_outcome(MessageKind::Sms, message_ref, false),
            FallbackDecision::Resend(_)
        ));
        assert_eq!(
            machine.state(message_ref),
            Some(FallbackState::IpFailedAwaitingResend)
        );
        assert!(matches!(
            machine.report_outcome(MessageKind::Sms, message_ref, false),
            FallbackDecision::Ignored
        ));

        machine.mark_resent(message_ref);
        assert_eq!(machine.state(message_ref), Some(FallbackState::Terminal));
        assert!(matches!(
            machine.report_outcome(MessageKind::Sms, message_ref, true),
            FallbackDecision::Ignored
        ));
    }

    #[test]
    fn test_unknown_ref_is_ignored() {
        let machine = TransportFallbackStateMachine::new();
        assert!(matches!(
            machine.report_outcome(MessageKind::Sms, MessageRef(7), false),
            FallbackDecision::Ignored
        ));
        machine.mark_resent(MessageRef(7));
        assert_eq!(machine.state(MessageRef(7)), None);
    }

    #[test]
    fn test_concurrent_failure_reports_resend_once() {
        let machine = Arc::new(TransportFallbackStateMachine::new());
        let (_, message_ref) = register(&machine);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = machine.clone();
                std::thread::spawn(move || machine.report_outcome(MessageKind::Sms, message_ref, false))
            })
            .collect();

        let resends = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|d| matches!(d, FallbackDecision::Resend(_)))
            .count();
        assert_eq!(resends, 1);
    }

    #[test]
    fn test_retire_untracked() {
        let machine = TransportFallbackStateMachine::new();
        let (kept, _) = register(&machine);
        register(&machine);

        assert_eq!(machine.retire_untracked(|id| id == kept), 1);
        assert_eq!(machine.live_count(), 1);
    }

    #[test]
    fn test_report_with_wrong_kind_is_ignored() {
        let machine = TransportFallbackStateMachine::new();
        let (_, sms_ref) = register(&machine);
        let mms_ref = machine.register(
            MessageId::new(),
            FallbackPayload::Mms {
                pdu: vec![0x8C, 0x80],
                location_url: None,
            },
        );
        assert_eq!(mms_ref, MessageRef(2));

        assert!(matches!(
            machine.report_outcome(MessageKind::Mms, sms_ref, false),
            FallbackDecision::Ignored
        ));
        assert_eq!(machine.state(sms_ref), Some(FallbackState::AwaitingIpResult));

        match machine.report_outcome(MessageKind::Mms, mms_ref, false) {
            FallbackDecision::Resend(entry) => {
                assert!(matches!(entry.payload, FallbackPayload::Mms { .. }));
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_detach_parts_until_exhausted() {
        let machine = TransportFallbackStateMachine::new();
        let (_, message_ref) = register(&machine);

        assert_eq!(
            machine.detach_parts(message_ref, &[1]),
            Some(FallbackState::AwaitingIpResult)
        );
        match machine.report_outcome(MessageKind::Sms, message_ref, false) {
            FallbackDecision::Resend(entry) => match entry.payload {
                FallbackPayload::Sms { parts, .. } => {
                    assert_eq!(parts.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0]);
                }
                other => panic!("unexpected payload: {other:?}"),
            },
            other => panic!("unexpected decision: {other:?}"),
        }

        let (_, other_ref) = register(&machine);
        assert_eq!(
            machine.detach_parts(other_ref, &[0, 1]),
            Some(FallbackState::Terminal)
        );
        assert!(matches!(
            machine.report_outcome(MessageKind::Sms, other_ref, false),
            FallbackDecision::Ignored
        ));
        assert_eq!(machine.detach_parts(MessageRef(99), &[0]), None);
    }
}
