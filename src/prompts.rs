/// Prompt for the three-language SEO summary. `{details}` is replaced with
/// the composed case text verbatim.
pub const SEO_SUMMARY_PROMPT: &str = r####"你是一位精通中文、英语、西班牙语的国际寻人专家和多语言 SEO 资深编辑。请分析以下失踪详情：
{details}

任务：为该案件生成中、英、西三语的 SEO 摘要（Summary）。

输出格式要求（必须是合法 JSON，严禁任何额外解释）：
JSON
[
  {
    "lang": "zh",
    "summary": "（150-300字的中文摘要。结构：姓名+时间+地点；核心体貌/衣着特征；呼吁行动。）"
  },
  {
    "lang": "en",
    "summary": "（150-300 words English summary. Professional, native tone, no robotic translation.）"
  },
  {
    "lang": "es",
    "summary": "（Resumen en español de 150-300 palabras. Estilo natural y urgente para búsqueda de personas.）"
  }
]

字段约束准则（严格遵守数据库 NOT NULL 约束）：
lang: 必须且只能是 zh, en, es 中的一个。
summary: 严禁为空。如果原文信息极少，请根据已知碎片信息进行合理扩充描述。

内容策略:
英文摘要需符合母语习惯（使用 "Last seen wearing", "Anyone with information" 等）。
西语摘要需地道（使用 "Visto por última vez", "Se solicita colaboración" 等）。
语言风格需庄重、客观，禁止使用感叹号。"####;

pub fn build_summary_prompt(details: &str) -> String {
    SEO_SUMMARY_PROMPT.replace("{details}", details)
}
