use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use metrics::counter;
use sms_domain::{CompletionToken, MessageId, PartCompletionSink, PartState, ResultCode};
use sms_errors::SmsError;
use tracing::{debug, info, warn};

/// 一次发送请求的跟踪上下文
#[derive(Debug)]
struct TrackingContext {
    created_at: Instant,
    state: Mutex<ContextState>,
}

#[derive(Debug)]
struct ContextState {
    parts: Vec<PartState>,
    sent_token: Option<CompletionToken>,
    delivered_tokens: Vec<Option<CompletionToken>>,
    aggregate_reported: bool,
}

impl ContextState {
    /// 编号最小的失败分段的结果码，全部成功时为 Success
    fn aggregate_code(&self) -> ResultCode {
        self.parts
            .iter()
            .find_map(|p| match p {
                PartState::SendFailed(code) => Some(*code),
                _ => None,
            })
            .unwrap_or(ResultCode::Success)
    }

    fn all_settled(&self) -> bool {
        self.parts.iter().all(PartState::is_settled)
    }

    fn is_retirable(&self) -> bool {
        self.aggregate_reported
            && self.parts.iter().enumerate().all(|(index, part)| match part {
                PartState::Pending => false,
                PartState::Sent => !matches!(self.delivered_tokens.get(index), Some(Some(_))),
                PartState::SendFailed(_) | PartState::Delivered => true,
            })
    }

    /// 所有分段都有发送结果且尚未汇总时取出发送令牌
    fn take_aggregate(&mut self) -> Option<(ResultCode, Option<CompletionToken>)> {
        if self.aggregate_reported || !self.all_settled() {
            return None;
        }
        self.aggregate_reported = true;
        Some((self.aggregate_code(), self.sent_token.take()))
    }
}

/// 投递状态跟踪器
///
/// 把各分段独立、乱序到达的完成信号汇总为一次“已发送”结果。
/// 同一分段的重复信号被忽略，未知或已回收的消息标识记为过期信号。
///
/// 调用方按分段提供的发送令牌中，只有最后一个接收汇总结果，其余令牌在登记时释放。
#[derive(Debug)]
pub struct DeliveryStatusTracker {
    contexts: RwLock<HashMap<MessageId, Arc<TrackingContext>>>,
    retirement_timeout: Duration,
}

impl DeliveryStatusTracker {
    pub fn new(retirement_timeout: Duration) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            retirement_timeout,
        }
    }

    /// 为一次发送分配跟踪上下文，令牌按分段序号对应，可以为空
    pub fn register(
        &self,
        message_id: MessageId,
        part_count: usize,
        sent_tokens: Vec<CompletionToken>,
        delivered_tokens: Vec<CompletionToken>,
    ) {
        let mut delivered: Vec<Option<CompletionToken>> =
            delivered_tokens.into_iter().take(part_count).map(Some).collect();
        delivered.resize_with(part_count, || None);

        let context = TrackingContext {
            created_at: Instant::now(),
            state: Mutex::new(ContextState {
                parts: vec![PartState::Pending; part_count],
                sent_token: sent_tokens.into_iter().last(),
                delivered_tokens: delivered,
                aggregate_reported: false,
            }),
        };

        debug!("注册跟踪上下文 {}，分段数 {}", message_id, part_count);
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message_id, Arc::new(context));
    }

    pub fn on_part_sent(&self, message_id: MessageId, index: usize, code: ResultCode) {
        self.apply(message_id, index, "sent", |state| {
            let current = state.parts[index];
            match current {
                PartState::Pending => {
                    state.parts[index] = if code.is_success() {
                        PartState::Sent
                    } else {
                        PartState::SendFailed(code)
                    };
                    debug!("消息 {} 分段 {} 发送结果: {}", message_id, index, code);
                }
                _ => debug!("忽略消息 {} 分段 {} 的重复发送信号", message_id, index),
            }
            None
        });
    }

    pub fn on_part_delivered(&self, message_id: MessageId, index: usize) {
        self.apply(message_id, index, "delivered", |state| {
            let current = state.parts[index];
            match current {
                PartState::Pending | PartState::Sent => {
                    // 投递报告先于发送结果到达时，视为发送成功
                    state.parts[index] = PartState::Delivered;
                    debug!("消息 {} 分段 {} 已投递", message_id, index);
                    state.delivered_tokens[index].take()
                }
                PartState::SendFailed(_) => {
                    debug!("消息 {} 分段 {} 发送失败，忽略投递报告", message_id, index);
                    None
                }
                PartState::Delivered => {
                    debug!("忽略消息 {} 分段 {} 的重复投递信号", message_id, index);
                    None
                }
            }
        });
    }

    /// 以给定结果码结算指定分段中仍未有发送结果的部分，返回上下文是否存在
    pub fn settle_pending(&self, message_id: MessageId, indices: &[usize], code: ResultCode) -> bool {
        let Some(context) = self.get(message_id) else {
            self.record_stale(message_id, "settle");
            return false;
        };

        let aggregate = {
            let mut state = context.state.lock().unwrap_or_else(PoisonError::into_inner);
            for index in indices {
                if let Some(part) = state.parts.get_mut(*index).filter(|p| !p.is_settled()) {
                    *part = if code.is_success() {
                        PartState::Sent
                    } else {
                        PartState::SendFailed(code)
                    };
                }
            }
            state.take_aggregate()
        };

        self.finish(message_id, &context, aggregate, None);
        true
    }

    pub fn contains(&self, message_id: MessageId) -> bool {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&message_id)
    }

    pub fn active_count(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn part_states(&self, message_id: MessageId) -> Option<Vec<PartState>> {
        self.get(message_id).map(|context| {
            context
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .parts
                .clone()
        })
    }

    /// 强制回收超时的上下文，未触发的令牌以 Timeout 结束
    pub fn sweep_expired(&self, now: Instant) -> Vec<MessageId> {
        let expired: Vec<(MessageId, Arc<TrackingContext>)> = {
            let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<MessageId> = contexts
                .iter()
                .filter(|(_, ctx)| now.saturating_duration_since(ctx.created_at) >= self.retirement_timeout)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| contexts.remove(&id).map(|ctx| (id, ctx)))
                .collect()
        };

        for (message_id, context) in &expired {
            let mut state = context.state.lock().unwrap_or_else(PoisonError::into_inner);
            let pending = state.parts.iter().filter(|p| !p.is_settled()).count();
            for part in state.parts.iter_mut().filter(|p| !p.is_settled()) {
                *part = PartState::SendFailed(ResultCode::Timeout);
            }

            let mut fired = 0;
            if !state.aggregate_reported {
                state.aggregate_reported = true;
                if let Some(token) = state.sent_token.take() {
                    token.fire(ResultCode::Timeout);
                    fired += 1;
                }
            }
            for token in state.delivered_tokens.iter_mut().filter_map(Option::take) {
                token.fire(ResultCode::Timeout);
                fired += 1;
            }

            let err = SmsError::Timeout(format!("跟踪上下文 {message_id} 超过回收时限"));
            warn!("{}，未完成分段 {} 个，超时通知 {} 个", err, pending, fired);
            counter!("sms_tracking_timeouts_total").increment(1);
        }

        expired.into_iter().map(|(id, _)| id).collect()
    }

    fn get(&self, message_id: MessageId) -> Option<Arc<TrackingContext>> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message_id)
            .cloned()
    }

    /// 在上下文锁内执行状态变更，锁外触发令牌
    fn apply<F>(&self, message_id: MessageId, index: usize, signal: &'static str, update: F)
    where
        F: FnOnce(&mut ContextState) -> Option<CompletionToken>,
    {
        let Some(context) = self.get(message_id) else {
            self.record_stale(message_id, signal);
            return;
        };

        let (delivered, aggregate) = {
            let mut state = context.state.lock().unwrap_or_else(PoisonError::into_inner);
            if index >= state.parts.len() {
                drop(state);
                debug!("消息 {} 不存在分段 {}", message_id, index);
                self.record_stale(message_id, signal);
                return;
            }
            let delivered = update(&mut *state);
            (delivered, state.take_aggregate())
        };

        self.finish(message_id, &context, aggregate, delivered);
    }

    fn finish(
        &self,
        message_id: MessageId,
        context: &Arc<TrackingContext>,
        aggregate: Option<(ResultCode, Option<CompletionToken>)>,
        delivered: Option<CompletionToken>,
    ) {
        if let Some(token) = delivered {
            token.fire(ResultCode::Success);
        }

        if let Some((code, token)) = aggregate {
            info!("消息 {} 全部分段已有发送结果，汇总结果: {}", message_id, code);
            if let Some(token) = token {
                token.fire(code);
            }
            counter!("sms_aggregate_reported_total", "result" => code.as_str()).increment(1);
        }

        let retirable = context
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_retirable();
        if retirable {
            let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
            if contexts
                .get(&message_id)
                .is_some_and(|current| Arc::ptr_eq(current, context))
            {
                contexts.remove(&message_id);
                debug!("跟踪上下文 {} 已完成并回收", message_id);
            }
        }
    }

    fn record_stale(&self, message_id: MessageId, signal: &'static str) {
        let err = SmsError::stale(format!("消息 {message_id} 的 {signal} 信号"));
        debug!("忽略信号: {}", err);
        counter!("sms_stale_signals_total", "signal" => signal).increment(1);
    }
}

impl PartCompletionSink for DeliveryStatusTracker {
    fn part_sent(&self, message_id: MessageId, index: usize, code: ResultCode) {
        self.on_part_sent(message_id, index, code);
    }

    fn part_delivered(&self, message_id: MessageId, index: usize) {
        self.on_part_delivered(message_id, index);
    }
}
