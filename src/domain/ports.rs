use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn ollama_url(&self) -> &str;
    fn output_dir(&self) -> &str;
    fn rounds(&self) -> usize;
    fn num_scenarios(&self) -> usize;
    fn evaluator_model(&self) -> &str;
    fn seed(&self) -> Option<u64>;
}

/// 本機推論服務：給模型名稱和提示詞，同步取回生成的文字
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<String>;
}
