//! 职位分类 → dev.bg URL 路径段

/// 常见口语分类到站点路径的固定映射（key 为小写）
const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("data science", "data-science"),
    ("machine learning", "data-science"),
    ("data", "data-science"),
    ("backend development", "back-end-development"),
    ("python development", "python"),
];

/// 分类参数：先查映射表，未命中则转小写并把空格替换为连字符
pub fn category_slug(category: &str) -> String {
    let key = category.to_lowercase();
    CATEGORY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, slug)| (*slug).to_string())
        .unwrap_or_else(|| key.replace(' ', "-"))
}
