//! Embodied-AI classification vocabulary
//!
//! The label table is static and ordered. It is the only place that
//! defines valid paper categories; everything else resolves through
//! [`normalize`] or [`label`].

use std::collections::HashMap;
use std::sync::OnceLock;

/// Sentinel for records that could not be placed in the taxonomy.
/// Never persisted for papers.
pub const UNCATEGORIZED: &str = "UNCATEGORIZED";

/// One taxonomy entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub key: &'static str,
    pub chinese: &'static str,
    pub english: &'static str,
    pub keywords: &'static [&'static str],
}

pub static LABELS: &[Label] = &[
    Label {
        key: "Perception/2D Perception",
        chinese: "二维感知",
        english: "2D Perception",
        keywords: &[
            "object detection",
            "semantic segmentation",
            "instance segmentation",
            "2d detection",
            "image segmentation",
            "目标检测",
        ],
    },
    Label {
        key: "Perception/3D Perception",
        chinese: "三维感知",
        english: "3D Perception",
        keywords: &[
            "point cloud",
            "3d perception",
            "3d detection",
            "depth estimation",
            "3d reconstruction",
            "occupancy",
            "gaussian splatting",
            "nerf",
            "点云",
        ],
    },
    Label {
        key: "Perception/Vision-Language Model",
        chinese: "视觉语言模型",
        english: "Vision-Language Model",
        keywords: &[
            "vision-language model",
            "vlm",
            "multimodal large language model",
            "mllm",
            "visual question answering",
            "视觉语言",
        ],
    },
    Label {
        key: "Perception/Tactile Perception",
        chinese: "触觉感知",
        english: "Tactile Perception",
        keywords: &["tactile", "visuotactile", "touch sensing", "haptic", "gelsight", "触觉"],
    },
    Label {
        key: "Perception/SLAM & Localization",
        chinese: "定位与建图",
        english: "SLAM & Localization",
        keywords: &["slam", "visual odometry", "localization", "mapping", "建图"],
    },
    Label {
        key: "Decision/Task Planning",
        chinese: "任务规划",
        english: "Task & Motion Planning",
        keywords: &[
            "task planning",
            "task and motion planning",
            "tamp",
            "long-horizon",
            "任务规划",
        ],
    },
    Label {
        key: "Decision/Chain of Thought",
        chinese: "思维链",
        english: "Chain of Thought",
        keywords: &[
            "chain-of-thought",
            "chain of thought",
            "embodied reasoning",
            "step-by-step reasoning",
            "思维链",
        ],
    },
    Label {
        key: "Decision/Navigation",
        chinese: "导航",
        english: "Navigation",
        keywords: &[
            "navigation",
            "vision-language navigation",
            "vln",
            "object goal navigation",
            "导航",
        ],
    },
    Label {
        key: "Decision/World Model",
        chinese: "世界模型",
        english: "World Model",
        keywords: &["world model", "video prediction", "dynamics model", "世界模型"],
    },
    Label {
        key: "Decision/Reinforcement Learning",
        chinese: "强化学习",
        english: "Reinforcement Learning",
        keywords: &[
            "reinforcement learning",
            "policy optimization",
            "reward shaping",
            "sim-to-real",
            "强化学习",
        ],
    },
    Label {
        key: "Operation/Grasp",
        chinese: "抓取",
        english: "Grasp",
        keywords: &["grasp", "grasping", "grasp detection", "grasp pose", "抓取"],
    },
    Label {
        key: "Operation/Dexterous Manipulation",
        chinese: "灵巧操作",
        english: "Dexterous Manipulation",
        keywords: &[
            "dexterous",
            "in-hand manipulation",
            "dexterous hand",
            "bimanual",
            "灵巧手",
        ],
    },
    Label {
        key: "Operation/Vision-Language-Action Models",
        chinese: "视觉语言动作模型",
        english: "Vision-Language-Action Models",
        keywords: &[
            "vision-language-action",
            "vla",
            "robot foundation model",
            "generalist policy",
        ],
    },
    Label {
        key: "Operation/Imitation Learning",
        chinese: "模仿学习",
        english: "Imitation Learning",
        keywords: &[
            "imitation learning",
            "behavior cloning",
            "diffusion policy",
            "teleoperation",
            "learning from demonstration",
            "模仿学习",
        ],
    },
    Label {
        key: "Operation/Mobile Manipulation",
        chinese: "移动操作",
        english: "Mobile Manipulation",
        keywords: &["mobile manipulation", "mobile manipulator", "移动操作"],
    },
    Label {
        key: "Locomotion/Legged Locomotion",
        chinese: "足式运动",
        english: "Legged Locomotion",
        keywords: &["legged", "quadruped", "locomotion", "biped", "四足"],
    },
    Label {
        key: "Locomotion/Humanoid",
        chinese: "人形机器人",
        english: "Humanoid",
        keywords: &["humanoid", "whole-body control", "人形"],
    },
    Label {
        key: "Benchmark/Datasets & Benchmarks",
        chinese: "数据集与基准",
        english: "Datasets & Benchmarks",
        keywords: &["embodied benchmark", "benchmark", "dataset", "数据集"],
    },
    Label {
        key: "Simulation/Simulators",
        chinese: "仿真平台",
        english: "Simulators",
        keywords: &[
            "simulator",
            "simulation platform",
            "isaac",
            "mujoco",
            "digital twin",
            "仿真",
        ],
    },
    Label {
        key: "General/Embodied AI",
        chinese: "具身智能",
        english: "Embodied AI",
        keywords: &["embodied ai", "embodied intelligence", "embodied agent", "具身智能"],
    },
];

/// Markers of a clearly off-topic domain
pub static NEGATIVE_MARKERS: &[&str] = &[
    "quantum",
    "molecule",
    "molecular",
    "chemistry",
    "chemical",
    "protein",
    "stock market",
    "finance",
    "financial",
    "cryptocurrency",
    "astrophysics",
    "galaxy",
    "particle physics",
    "dark matter",
    "superconduct",
    "量子",
    "化学",
    "金融",
];

/// Any of these rescues a text from the negative-domain exclusion
pub static ROBOT_CONTEXT_MARKERS: &[&str] = &[
    "robot",
    "robotic",
    "embodied",
    "manipulation",
    "grasp",
    "humanoid",
    "机器人",
    "具身",
];

/// Fallback label when nothing more specific applies
pub const CATCH_ALL: &str = "General/Embodied AI";

/// Look up a label by its canonical key
pub fn label(key: &str) -> Option<&'static Label> {
    LABELS.iter().find(|l| l.key == key)
}

pub fn is_valid(key: &str) -> bool {
    label(key).is_some()
}

fn aliases() -> &'static HashMap<String, &'static str> {
    static ALIASES: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    ALIASES.get_or_init(|| {
        let mut map = HashMap::new();
        for l in LABELS {
            let names = [l.key, l.chinese, l.english]
                .into_iter()
                .chain(l.keywords.iter().copied());
            for name in names {
                // First label to claim an alias keeps it
                map.entry(name.to_lowercase()).or_insert(l.key);
            }
        }
        map
    })
}

/// Resolve a free-form category string to a label key.
///
/// Accepts the key itself, either display name or any keyword, case
/// insensitively. Returns [`UNCATEGORIZED`] for anything else.
pub fn normalize(raw: &str) -> &'static str {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return UNCATEGORIZED;
    }
    aliases().get(&needle).copied().unwrap_or(UNCATEGORIZED)
}

/// Provider query for a label: its ASCII keywords joined by `OR`
pub fn default_query(label: &Label) -> String {
    label
        .keywords
        .iter()
        .filter(|k| k.is_ascii())
        .copied()
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// `(label-key, query)` pairs for every label, in taxonomy order
pub fn default_queries() -> Vec<(String, String)> {
    LABELS
        .iter()
        .map(|l| (l.key.to_string(), default_query(l)))
        .filter(|(_, q)| !q.is_empty())
        .collect()
}
