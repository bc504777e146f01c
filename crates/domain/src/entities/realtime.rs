//! 实时通道相关实体
//!
//! 定义连接标识以及客户端/服务器之间的消息帧。每个帧都是
//! `{"action": ..., "value": ...}` 形式的 JSON 文本。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// 连接标识
///
/// 128 位随机数的十六进制表示，连接建立时生成。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// 生成新的连接标识
    pub fn generate() -> Self {
        let bits: u128 = rand::random();
        Self(format!("{bits:032x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `SEND_MESSAGE` 的载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub message: String,
    /// 客户端自报的连接标识，仅用于诊断
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// `USER_ENTER` 的载荷
///
/// 用户名缺失、为 `null` 或不是字符串时为 `None`，按登记失败处理。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnterPayload {
    #[serde(default, deserialize_with = "string_or_none")]
    pub username: Option<String>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(name) => Some(name),
        _ => None,
    })
}

/// 客户端发往服务器的动作
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// 发送聊天消息
    SendMessage(ChatPayload),
    /// 申请用户名
    UserEnter(UserEnterPayload),
    /// 修改共享值
    SendValue(Value),
}

#[derive(Deserialize)]
struct RawFrame {
    action: String,
    #[serde(default)]
    value: Value,
}

impl ClientAction {
    /// 解析客户端文本帧
    ///
    /// 未知的 `action` 返回 `Ok(None)`；JSON 格式错误或载荷结构不符返回错误。
    pub fn parse(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let frame: RawFrame = serde_json::from_str(text)?;
        let action = match frame.action.as_str() {
            "SEND_MESSAGE" => ClientAction::SendMessage(serde_json::from_value(frame.value)?),
            "USER_ENTER" => ClientAction::UserEnter(serde_json::from_value(frame.value)?),
            "SEND_VALUE" => ClientAction::SendValue(frame.value),
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    /// 动作名称，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::SendMessage(_) => "SEND_MESSAGE",
            ClientAction::UserEnter(_) => "USER_ENTER",
            ClientAction::SendValue(_) => "SEND_VALUE",
        }
    }
}

/// 广播的聊天消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message: String,
    /// 发送者用户名，未登记用户名时为空字符串
    pub sent_by: String,
    pub message_id: u64,
}

/// 用户名登记成功的回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnterSuccess {
    pub username: String,
    /// 当前所有在线用户名（按登记顺序）
    pub users: Vec<String>,
}

/// 服务器发往客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// 共享值
    SetValue(Value),
    /// 告知客户端自己的连接标识
    SetConnectionId(ConnectionId),
    /// 聊天消息
    MessageFromServer(ChatMessage),
    /// 用户名登记成功
    UserEnterSuccess(UserEnterSuccess),
    /// 用户名登记失败
    UserEnterFail,
}

impl ServerEvent {
    /// 序列化为文本帧
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
