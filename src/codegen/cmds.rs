// src/codegen/cmds.rs
//! Structured Minecraft commands. The analyzer lowers runtime
//! operations into these values; they resolve to command text only at
//! write-out, so scoreboard slots and file paths stay symbolic until
//! then.

use serde_json::json;

const TERMINATOR_CHARS: &str = " ,@~^/$&\"'!#%+*=[{]}\\|<>`\n";

/// Quote a string for command syntax when it contains characters the
/// game would treat as terminators.
pub fn mc_str(s: &str) -> String {
    if s.is_empty() {
        return "\"\"".to_string();
    }
    if s.chars().any(|c| TERMINATOR_CHARS.contains(c)) {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('"');
        for c in s.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    } else {
        s.to_string()
    }
}

/// Selectors pass through unquoted; plain names follow `mc_str`.
pub fn mc_selector(s: &str) -> String {
    if s.starts_with('@') {
        s.to_string()
    } else {
        mc_str(s)
    }
}

/// Like `mc_selector` but also allows the `*` wildcard.
pub fn mc_wc_selector(s: &str) -> String {
    if s == "*" {
        s.to_string()
    } else {
        mc_selector(s)
    }
}

/// One scoreboard cell: a target (fake player or selector) plus an
/// objective.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScbSlot {
    pub target: String,
    pub objective: String,
}

impl ScbSlot {
    pub fn new(target: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            objective: objective.into(),
        }
    }

    pub fn to_str(&self) -> String {
        format!(
            "{} {}",
            mc_wc_selector(&self.target),
            mc_str(&self.objective)
        )
    }
}

/// Scoreboard `operation` operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScbOp {
    AddEq,
    SubEq,
    MulEq,
    DivEq,
    ModEq,
    Min,
    Max,
    Assign,
}

impl ScbOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddEq => "+=",
            Self::SubEq => "-=",
            Self::MulEq => "*=",
            Self::DivEq => "/=",
            Self::ModEq => "%=",
            Self::Min => "<",
            Self::Max => ">",
            Self::Assign => "=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScbCompareOp {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl ScbCompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
        }
    }
}

/// One `execute` subcommand
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteSub {
    /// Environment subcommand: `as`, `at`, `positioned`, `rotated`, ...
    Env { kind: String, args: String },
    /// `if|unless entity <selector>`
    Entity { selector: String, invert: bool },
    /// `if|unless score a <op> b`
    ScoreComp {
        lhs: ScbSlot,
        op: ScbCompareOp,
        rhs: ScbSlot,
        invert: bool,
    },
    /// `if|unless score a matches <range>`
    ScoreMatch {
        slot: ScbSlot,
        range: String,
        invert: bool,
    },
}

impl ExecuteSub {
    pub fn env(kind: impl Into<String>, args: impl Into<String>) -> Self {
        Self::Env {
            kind: kind.into(),
            args: args.into(),
        }
    }

    pub fn resolve(&self) -> String {
        match self {
            Self::Env { kind, args } => format!("{} {}", kind, args),
            Self::Entity { selector, invert } => {
                format!("{} entity {}", if *invert { "unless" } else { "if" }, selector)
            }
            Self::ScoreComp {
                lhs,
                op,
                rhs,
                invert,
            } => format!(
                "{} score {} {} {}",
                if *invert { "unless" } else { "if" },
                lhs.to_str(),
                op.as_str(),
                rhs.to_str()
            ),
            Self::ScoreMatch {
                slot,
                range,
                invert,
            } => format!(
                "{} score {} matches {}",
                if *invert { "unless" } else { "if" },
                slot.to_str(),
                range
            ),
        }
    }

    /// Flip if/unless where that is possible.
    pub fn inverted(&self) -> Option<ExecuteSub> {
        match self {
            Self::Env { .. } => None,
            Self::Entity { selector, invert } => Some(Self::Entity {
                selector: selector.clone(),
                invert: !invert,
            }),
            Self::ScoreComp {
                lhs,
                op,
                rhs,
                invert,
            } => Some(Self::ScoreComp {
                lhs: lhs.clone(),
                op: *op,
                rhs: rhs.clone(),
                invert: !invert,
            }),
            Self::ScoreMatch {
                slot,
                range,
                invert,
            } => Some(Self::ScoreMatch {
                slot: slot.clone(),
                range: range.clone(),
                invert: !invert,
            }),
        }
    }
}

/// One component of a `tellraw`/`titleraw` JSON payload
#[derive(Debug, Clone, PartialEq)]
pub enum RawtextPart {
    Text(String),
    Score { name: String, objective: String },
    Translate(String),
}

impl RawtextPart {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(text) => json!({ "text": text }),
            Self::Score { name, objective } => {
                json!({ "score": { "name": name, "objective": objective } })
            }
            Self::Translate(key) => json!({ "translate": key }),
        }
    }
}

/// A lowered runtime operation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Verbatim command text (raw commands, misc one-offs)
    Raw(String),
    /// `# ...` comment line (debug output only)
    Comment(String),
    ScbSetConst { slot: ScbSlot, value: i32 },
    ScbAddConst { slot: ScbSlot, value: i32 },
    ScbRemoveConst { slot: ScbSlot, value: i32 },
    ScbOperation {
        op: ScbOp,
        lhs: ScbSlot,
        rhs: ScbSlot,
    },
    ScbRandom {
        slot: ScbSlot,
        min: i32,
        max: i32,
    },
    ScbObjAdd { name: String },
    TagAdd { target: String, tag: String },
    TagRemove { target: String, tag: String },
    Execute {
        subcmds: Vec<ExecuteSub>,
        run: Box<Command>,
    },
    InvokeFunction { path: String },
    Rawtext {
        prefix: String,
        components: Vec<RawtextPart>,
    },
}

impl Command {
    /// Guard a command with execute subcommands, flattening nested
    /// `execute` chains the way a hand-written command would read.
    pub fn execute(subcmds: Vec<ExecuteSub>, run: Command) -> Command {
        if subcmds.is_empty() {
            return run;
        }
        match run {
            Command::Execute {
                subcmds: inner,
                run,
            } => {
                let mut all = subcmds;
                all.extend(inner);
                Command::Execute { subcmds: all, run }
            }
            other => Command::Execute {
                subcmds,
                run: Box::new(other),
            },
        }
    }

    pub fn resolve(&self) -> String {
        match self {
            Self::Raw(text) => text.clone(),
            Self::Comment(text) => format!("# {}", text),
            Self::ScbSetConst { slot, value } => {
                format!("scoreboard players set {} {}", slot.to_str(), value)
            }
            Self::ScbAddConst { slot, value } => {
                format!("scoreboard players add {} {}", slot.to_str(), value)
            }
            Self::ScbRemoveConst { slot, value } => {
                format!("scoreboard players remove {} {}", slot.to_str(), value)
            }
            Self::ScbOperation { op, lhs, rhs } => format!(
                "scoreboard players operation {} {} {}",
                lhs.to_str(),
                op.as_str(),
                rhs.to_str()
            ),
            Self::ScbRandom { slot, min, max } => {
                format!("scoreboard players random {} {} {}", slot.to_str(), min, max)
            }
            Self::ScbObjAdd { name } => {
                format!("scoreboard objectives add {} dummy", mc_str(name))
            }
            Self::TagAdd { target, tag } => {
                format!("tag {} add {}", target, mc_str(tag))
            }
            Self::TagRemove { target, tag } => {
                format!("tag {} remove {}", target, mc_str(tag))
            }
            Self::Execute { subcmds, run } => {
                if subcmds.is_empty() {
                    run.resolve()
                } else {
                    format!(
                        "execute {} run {}",
                        subcmds
                            .iter()
                            .map(ExecuteSub::resolve)
                            .collect::<Vec<_>>()
                            .join(" "),
                        run.resolve()
                    )
                }
            }
            Self::InvokeFunction { path } => format!("function {}", path),
            Self::Rawtext { prefix, components } => {
                let parts: Vec<serde_json::Value> =
                    components.iter().map(RawtextPart::to_json).collect();
                format!("{} {}", prefix, json!({ "rawtext": parts }))
            }
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Self::Comment(_))
    }
}

/// An in-memory `.mcfunction` file: a path relative to the function
/// folder (no extension) plus its commands.
#[derive(Debug, Clone)]
pub struct McFunctionFile {
    pub path: String,
    pub commands: Vec<Command>,
}

impl McFunctionFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            commands: Vec::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        self.commands.iter().any(|c| !c.is_comment())
    }

    /// Number of real command lines (comments excluded)
    pub fn line_count(&self) -> usize {
        self.commands.iter().filter(|c| !c.is_comment()).count()
    }

    pub fn to_text(&self) -> String {
        self.commands
            .iter()
            .map(Command::resolve)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mc_str_quotes_when_needed() {
        assert_eq!(mc_str("acacia"), "acacia");
        assert_eq!(mc_str("has space"), "\"has space\"");
        assert_eq!(mc_str(""), "\"\"");
        assert_eq!(mc_str("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn selectors_stay_bare() {
        assert_eq!(mc_selector("@e[tag=x]"), "@e[tag=x]");
        assert_eq!(mc_wc_selector("*"), "*");
        assert_eq!(mc_selector("player name"), "\"player name\"");
    }

    #[test]
    fn resolve_scoreboard_commands() {
        let slot = ScbSlot::new("acacia1", "acacia");
        assert_eq!(
            Command::ScbSetConst {
                slot: slot.clone(),
                value: 3889
            }
            .resolve(),
            "scoreboard players set acacia1 acacia 3889"
        );
        assert_eq!(
            Command::ScbOperation {
                op: ScbOp::AddEq,
                lhs: slot.clone(),
                rhs: ScbSlot::new("acacia2", "acacia"),
            }
            .resolve(),
            "scoreboard players operation acacia1 acacia += acacia2 acacia"
        );
        assert_eq!(
            Command::ScbObjAdd {
                name: "acacia".to_string()
            }
            .resolve(),
            "scoreboard objectives add acacia dummy"
        );
    }

    #[test]
    fn resolve_execute_chain() {
        let cmd = Command::execute(
            vec![ExecuteSub::ScoreMatch {
                slot: ScbSlot::new("acacia1", "acacia"),
                range: "1".to_string(),
                invert: false,
            }],
            Command::InvokeFunction {
                path: "lib/acacia1".to_string(),
            },
        );
        assert_eq!(
            cmd.resolve(),
            "execute if score acacia1 acacia matches 1 run function lib/acacia1"
        );
    }

    #[test]
    fn execute_flattens_nested_chains() {
        let inner = Command::execute(
            vec![ExecuteSub::env("as", "@e[tag=x]")],
            Command::Raw("say hi".to_string()),
        );
        let outer = Command::execute(
            vec![ExecuteSub::Entity {
                selector: "@p".to_string(),
                invert: false,
            }],
            inner,
        );
        assert_eq!(
            outer.resolve(),
            "execute if entity @p as @e[tag=x] run say hi"
        );
    }

    #[test]
    fn empty_subcmds_resolve_to_plain_command() {
        let cmd = Command::execute(vec![], Command::Raw("say hi".to_string()));
        assert_eq!(cmd.resolve(), "say hi");
    }

    #[test]
    fn rawtext_payload() {
        let cmd = Command::Rawtext {
            prefix: "tellraw @a".to_string(),
            components: vec![
                RawtextPart::Text("value: ".to_string()),
                RawtextPart::Score {
                    name: "acacia3".to_string(),
                    objective: "acacia".to_string(),
                },
            ],
        };
        let text = cmd.resolve();
        assert!(text.starts_with("tellraw @a {"));
        assert!(text.contains("\"rawtext\""));
        assert!(text.contains("\"acacia3\""));
    }

    #[test]
    fn inverted_subcommands() {
        let sub = ExecuteSub::ScoreMatch {
            slot: ScbSlot::new("t", "acacia"),
            range: "1".to_string(),
            invert: false,
        };
        assert_eq!(
            sub.inverted().unwrap().resolve(),
            "unless score t acacia matches 1"
        );
        assert!(ExecuteSub::env("as", "@s").inverted().is_none());
    }

    #[test]
    fn file_line_count_skips_comments() {
        let mut file = McFunctionFile::new("main");
        file.commands.push(Command::Comment("banner".to_string()));
        file.commands.push(Command::Raw("say hi".to_string()));
        assert_eq!(file.line_count(), 1);
        assert!(file.has_content());
    }
}
