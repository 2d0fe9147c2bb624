//! 支付订单与审计文档

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::{AnomalyKind, AuditSource, Currency, OrderState};
use super::ledger::LedgerEntry;

/// 支付订单
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    /// 本系统生成的关联 ID，所有通道都以它定位订单
    pub merchant_order_id: String,
    /// 网关分配的订单号，网关应答前为空
    #[sqlx(default)]
    pub system_order_id: Option<String>,
    /// 金额（最小货币单位，10.00 GBP = 1000）
    pub amount_minor: i64,
    pub currency: Currency,
    pub user_email: String,
    /// 批准后充值的代币数
    pub tokens: i64,
    pub description: String,
    pub status: OrderState,
    /// 审计文档，按来源分键
    pub response: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 充值流水的 reference
    pub fn ledger_reference(&self) -> String {
        format!("order:{}", self.merchant_order_id)
    }

    /// 解析审计文档
    pub fn audit_trail(&self) -> AuditTrail {
        AuditTrail::from_document(&self.response)
    }
}

/// 创建订单参数
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub merchant_order_id: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub user_email: String,
    pub tokens: i64,
    pub description: String,
}

/// 单个来源的审计快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSnapshot {
    pub received_at: DateTime<Utc>,
    pub payload: Value,
    /// 同一来源在本快照之外收到的其他快照（结算竞争失败方、终态后的重复投递）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<AuditSnapshot>,
}

/// 快照写入本来源子键的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditMerge {
    /// 替换主快照，保留已有 duplicates
    #[default]
    Replace,
    /// 赢得结算：成为主快照，原主快照移入 duplicates
    Settlement,
    /// 追加到 duplicates；尚无主快照时直接成为主快照
    Duplicate,
}

/// 一次待合并的审计记录
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub source: AuditSource,
    pub snapshot: AuditSnapshot,
    pub mode: AuditMerge,
}

impl AuditEntry {
    pub fn new(source: AuditSource, payload: Value) -> Self {
        Self {
            source,
            snapshot: AuditSnapshot {
                received_at: Utc::now(),
                payload,
                duplicates: Vec::new(),
            },
            mode: AuditMerge::Replace,
        }
    }

    pub fn with_mode(mut self, mode: AuditMerge) -> Self {
        self.mode = mode;
        self
    }

    /// 序列化后的快照值（不含 duplicates）
    pub fn snapshot_value(&self) -> Value {
        serde_json::to_value(&self.snapshot).unwrap_or(Value::Null)
    }

    /// 将快照合并进审计文档
    ///
    /// 只改动本来源的子键，其他来源保持不变；非对象文档被重置为空对象。
    /// 已有快照不会被静默覆盖丢失，除非模式为 Replace（仅替换主快照）
    pub fn merge_into(&self, document: &mut Value) {
        if !document.is_object() {
            *document = Value::Object(Map::new());
        }
        let Value::Object(map) = document else {
            return;
        };

        let key = self.source.key();
        let incoming = self.snapshot_value();
        let merged = match map.remove(key) {
            Some(Value::Object(mut current)) => match self.mode {
                AuditMerge::Replace => {
                    let mut next = incoming;
                    if let (Value::Object(next_map), Some(dups)) =
                        (&mut next, current.remove("duplicates"))
                    {
                        next_map.insert("duplicates".to_string(), dups);
                    }
                    next
                }
                AuditMerge::Settlement => {
                    let mut dups = take_duplicates(&mut current);
                    dups.push(Value::Object(current));
                    let mut next = incoming;
                    if let Value::Object(next_map) = &mut next {
                        next_map.insert("duplicates".to_string(), Value::Array(dups));
                    }
                    next
                }
                AuditMerge::Duplicate => {
                    let mut dups = take_duplicates(&mut current);
                    dups.push(incoming);
                    current.insert("duplicates".to_string(), Value::Array(dups));
                    Value::Object(current)
                }
            },
            _ => incoming,
        };
        map.insert(key.to_string(), merged);
    }
}

/// 取出已有 duplicates；非数组值作为单个元素保留
fn take_duplicates(current: &mut Map<String, Value>) -> Vec<Value> {
    match current.remove("duplicates") {
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

/// 审计文档的类型化视图
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<AuditSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AuditSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<AuditSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AuditSnapshot>,
}

impl AuditTrail {
    /// 从审计文档解析，无法识别的子键被忽略
    pub fn from_document(document: &Value) -> Self {
        let get = |source: AuditSource| {
            document
                .get(source.key())
                .and_then(|v| serde_json::from_value::<AuditSnapshot>(v.clone()).ok())
        };
        Self {
            sale: get(AuditSource::Sale),
            status: get(AuditSource::Status),
            webhook: get(AuditSource::Webhook),
            result: get(AuditSource::Result),
        }
    }

    pub fn get(&self, source: AuditSource) -> Option<&AuditSnapshot> {
        match source {
            AuditSource::Sale => self.sale.as_ref(),
            AuditSource::Status => self.status.as_ref(),
            AuditSource::Webhook => self.webhook.as_ref(),
            AuditSource::Result => self.result.as_ref(),
        }
    }

    /// 按接收时间从新到旧排列的快照
    pub fn newest_first(&self) -> Vec<(AuditSource, &AuditSnapshot)> {
        let mut snapshots: Vec<_> = [
            AuditSource::Sale,
            AuditSource::Status,
            AuditSource::Webhook,
            AuditSource::Result,
        ]
        .into_iter()
        .filter_map(|source| self.get(source).map(|s| (source, s)))
        .collect();
        snapshots.sort_by(|a, b| b.1.received_at.cmp(&a.1.received_at));
        snapshots
    }
}

/// 终态结算结果
#[derive(Debug, Clone)]
pub struct SettleResult {
    /// 结算后的订单
    pub order: Order,
    /// 本次调用是否赢得 PROCESSING -> 终态 的转换
    pub won: bool,
    /// 赢得 APPROVED 转换时写入的充值流水
    pub credit: Option<LedgerEntry>,
}

/// 关联失败记录
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: i64,
    pub kind: AnomalyKind,
    #[sqlx(default)]
    pub merchant_order_id: Option<String>,
    pub detail: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnomaly {
    pub kind: AnomalyKind,
    pub merchant_order_id: Option<String>,
    pub detail: Value,
}

impl NewAnomaly {
    pub fn new(kind: AnomalyKind, merchant_order_id: Option<&str>, detail: Value) -> Self {
        Self {
            kind,
            merchant_order_id: merchant_order_id.map(str::to_string),
            detail,
        }
    }
}
