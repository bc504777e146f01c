use serde_json::Value;

/// 所有连接共享的单个值
///
/// 内容对服务器是不透明的 JSON，写入时不做任何校验。
#[derive(Debug, Clone)]
pub struct SharedValue {
    value: Value,
}

impl SharedValue {
    pub fn new(initial: Value) -> Self {
        Self { value: initial }
    }

    pub fn get(&self) -> &Value {
        &self.value
    }

    pub fn set(&mut self, value: Value) {
        self.value = value;
    }
}

impl Default for SharedValue {
    fn default() -> Self {
        Self::new(Value::from(0))
    }
}
