// tests/compile.rs
//! End-to-end pipeline tests: compile Acacia sources in memory and
//! check the emitted command text. A small scoreboard interpreter runs
//! the arithmetic outputs so lowering is checked against actual
//! values, not just command shapes.

use std::collections::{HashMap, HashSet};

use acacia::compiler::{Config, Failure, compile_source};
use acacia::errors::CompileError;

fn compile(source: &str) -> Result<acacia::codegen::Output, Failure> {
    compile_source(source, "test.aca", &Config::default())
}

fn compile_ok(source: &str) -> acacia::codegen::Output {
    match compile(source) {
        Ok(output) => output,
        Err(failure) => panic!("compilation failed: {:?}", failure.error),
    }
}

fn sema_code(failure: &Failure) -> String {
    use miette::Diagnostic;
    failure
        .error
        .code()
        .map(|c| c.to_string())
        .unwrap_or_default()
}

// --- A tiny scoreboard interpreter over the emitted commands ---

#[derive(Default)]
struct Sim {
    scores: HashMap<(String, String), i64>,
    files: HashMap<String, Vec<String>>,
    /// Summoned entities: name -> tag set
    entities: HashMap<String, HashSet<String>>,
}

impl Sim {
    fn load(output: &acacia::codegen::Output) -> Sim {
        let mut sim = Sim::default();
        for (path, text) in output.text_files() {
            let path = path.trim_end_matches(".mcfunction").to_string();
            sim.files
                .insert(path, text.lines().map(str::to_string).collect());
        }
        sim
    }

    fn get(&self, target: &str, objective: &str) -> i64 {
        *self
            .scores
            .get(&(target.to_string(), objective.to_string()))
            .unwrap_or(&0)
    }

    fn set(&mut self, target: &str, objective: &str, value: i64) {
        self.scores
            .insert((target.to_string(), objective.to_string()), value);
    }

    fn run(&mut self, path: &str) {
        let lines = self
            .files
            .get(path)
            .unwrap_or_else(|| panic!("no such function file: {path}"))
            .clone();
        for line in lines {
            self.exec(&line);
        }
    }

    fn exec(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        if let Some(rest) = line.strip_prefix("execute ") {
            let (subcmds, run) = rest.split_once(" run ").expect("execute without run");
            if self.check_subcmds(subcmds) {
                self.exec(run);
            }
            return;
        }
        if let Some(rest) = line.strip_prefix("function ") {
            self.run(rest);
            return;
        }
        if let Some(rest) = line.strip_prefix("summon ") {
            let words: Vec<&str> = rest.split_whitespace().collect();
            self.entities.insert(words[1].to_string(), HashSet::new());
            return;
        }
        if let Some(rest) = line.strip_prefix("tag ") {
            let words: Vec<&str> = rest.split_whitespace().collect();
            for name in self.select(words[0]) {
                let tags = self.entities.get_mut(&name).unwrap();
                if words[1] == "add" {
                    tags.insert(words[2].to_string());
                } else {
                    tags.remove(words[2]);
                }
            }
            return;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() != Some(&"scoreboard") {
            return; // say/tellraw etc. are inert here
        }
        match words[1] {
            "objectives" => {}
            "players" => match words[2] {
                "set" => self.set(words[3], words[4], words[5].parse().unwrap()),
                "add" => {
                    let v = self.get(words[3], words[4]) + words[5].parse::<i64>().unwrap();
                    self.set(words[3], words[4], v);
                }
                "remove" => {
                    let v = self.get(words[3], words[4]) - words[5].parse::<i64>().unwrap();
                    self.set(words[3], words[4], v);
                }
                "random" => {
                    // Deterministic stand-in: the lower bound
                    self.set(words[3], words[4], words[5].parse().unwrap());
                }
                "operation" => {
                    let lhs = self.get(words[3], words[4]);
                    let rhs = self.get(words[6], words[7]);
                    let result = match words[5] {
                        "=" => rhs,
                        "+=" => lhs + rhs,
                        "-=" => lhs - rhs,
                        "*=" => lhs * rhs,
                        "/=" => lhs.div_euclid(rhs),
                        "%=" => lhs.rem_euclid(rhs),
                        "<" => lhs.min(rhs),
                        ">" => lhs.max(rhs),
                        other => panic!("operation {other}"),
                    };
                    self.set(words[3], words[4], result);
                }
                other => panic!("players {other}"),
            },
            other => panic!("scoreboard {other}"),
        }
    }

    fn check_subcmds(&self, subcmds: &str) -> bool {
        let words: Vec<&str> = subcmds.split_whitespace().collect();
        let mut i = 0;
        while i < words.len() {
            match words[i] {
                "as" => {
                    if self.select(words[i + 1]).is_empty() {
                        return false;
                    }
                    i += 2;
                }
                "if" | "unless" => {
                    let invert = words[i] == "unless";
                    let holds = if words[i + 1] == "entity" {
                        let found = !self.select(words[i + 2]).is_empty();
                        i += 3;
                        found
                    } else {
                        assert_eq!(words[i + 1], "score");
                        let lhs = self.get(words[i + 2], words[i + 3]);
                        if words[i + 4] == "matches" {
                            let range = words[i + 5];
                            i += 6;
                            in_range(lhs, range)
                        } else {
                            let rhs = self.get(words[i + 5], words[i + 6]);
                            let op = words[i + 4];
                            i += 7;
                            match op {
                                "=" => lhs == rhs,
                                "<" => lhs < rhs,
                                ">" => lhs > rhs,
                                "<=" => lhs <= rhs,
                                ">=" => lhs >= rhs,
                                other => panic!("score op {other}"),
                            }
                        }
                    };
                    if holds == invert {
                        return false;
                    }
                }
                other => panic!("unsupported execute subcommand in test: {other}"),
            }
        }
        true
    }

    /// Entities matched by a target: a bare name or an `@e[...]`
    /// selector over tags and names.
    fn select(&self, target: &str) -> Vec<String> {
        let Some(rest) = target.strip_prefix("@e") else {
            return if self.entities.contains_key(target) {
                vec![target.to_string()]
            } else {
                vec![]
            };
        };
        let mut req_tags: Vec<&str> = Vec::new();
        let mut neg_tags: Vec<&str> = Vec::new();
        let mut name: Option<&str> = None;
        if let Some(args) = rest.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            for part in args.split(',') {
                let (key, value) = part.split_once('=').expect("selector arg");
                match key {
                    "tag" => {
                        if let Some(negated) = value.strip_prefix('!') {
                            neg_tags.push(negated);
                        } else {
                            req_tags.push(value);
                        }
                    }
                    "name" => name = Some(value),
                    _ => {}
                }
            }
        }
        self.entities
            .iter()
            .filter(|(entity_name, tags)| {
                name.is_none_or(|n| n == entity_name.as_str())
                    && req_tags.iter().all(|t| tags.contains(*t))
                    && neg_tags.iter().all(|t| !tags.contains(*t))
            })
            .map(|(n, _)| n.clone())
            .collect()
    }
}

fn in_range(value: i64, range: &str) -> bool {
    if let Some((lo, hi)) = range.split_once("..") {
        let lo_ok = lo.is_empty() || value >= lo.parse::<i64>().unwrap();
        let hi_ok = hi.is_empty() || value <= hi.parse::<i64>().unwrap();
        lo_ok && hi_ok
    } else {
        value == range.parse::<i64>().unwrap()
    }
}

/// Find the score slot a tellraw line displays.
fn tellraw_score(output: &acacia::codegen::Output, file: &str) -> (String, String) {
    let text = output.file_text(file).expect("file exists");
    let line = text
        .lines()
        .find(|l| l.starts_with("tellraw"))
        .expect("a tellraw line");
    let json_start = line.find('{').unwrap();
    let value: serde_json::Value = serde_json::from_str(&line[json_start..]).unwrap();
    for part in value["rawtext"].as_array().unwrap() {
        if let Some(score) = part.get("score") {
            return (
                score["name"].as_str().unwrap().to_string(),
                score["objective"].as_str().unwrap().to_string(),
            );
        }
    }
    panic!("tellraw has no score component");
}

// --- S1: constant folding ---

#[test]
fn s1_constant_folding_sinks_to_init() {
    let output = compile_ok("x = 0XF2e + 0b11\n");
    let init = output.file_text("init").unwrap();
    assert!(
        init.contains("scoreboard players set acacia1 acacia 3889"),
        "init file should load the folded constant, got:\n{init}"
    );
    let main = output.file_text("main").unwrap();
    assert!(
        !main.contains("scoreboard players add"),
        "no runtime add should be emitted, got:\n{main}"
    );
}

// --- S2: arithmetic function through the interpreter ---

#[test]
fn s2_arithmetic_sum_displays_minus_184() {
    let source = "\
import print

def arithmetic(a: int, b: int, delta: int = 1) -> int:
    n := (b - a) / delta + 1
    result (a + b) * n / 2

s := arithmetic(-30, 14, delta=2)
print.tell(\"sum: {s}\")
";
    let output = compile_ok(source);
    let mut sim = Sim::load(&output);
    sim.run("init");
    sim.run("main");
    let (name, objective) = tellraw_score(&output, "main");
    assert_eq!(sim.get(&name, &objective), -184);
}

// --- S3: compile-time for over a map ---

#[test]
fn s3_for_over_map_unrolls_per_entry() {
    let source = "\
const COLORS = {\"white\": 0, \"orange\": 1, \"magenta\": 2, \"yellow\": 4, \"lime\": 5, \"pink\": 6, \"gray\": 7}
for c in COLORS:
    const v = COLORS[c]
    /say ${c} is ${v}
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    let says: Vec<&str> = main.lines().filter(|l| l.starts_with("say")).collect();
    assert_eq!(says.len(), 7, "one expansion per map entry");
    assert_eq!(says[0], "say white is 0");
    assert_eq!(says[3], "say yellow is 4");
    assert_eq!(says[6], "say gray is 7");
}

// --- S4: MRO successes and failure ---

#[test]
fn s4_diamond_mro_resolves() {
    let source = "\
entity A:
    pass
entity B(A):
    pass
entity C(A):
    pass
entity D(B, C):
    pass
";
    compile_ok(source);

    let flipped = "\
entity A:
    pass
entity B(A):
    pass
entity C(A):
    pass
entity D(C, B):
    pass
";
    compile_ok(flipped);
}

#[test]
fn s4_inconsistent_mro_fails() {
    let source = "\
entity A:
    pass
entity B(A):
    pass
entity C(A):
    pass
entity X(B, C):
    pass
entity Y(C, B):
    pass
entity Z(X, Y):
    pass
";
    let failure = compile(source).expect_err("Z has no linearization");
    assert_eq!(sema_code(&failure), "E2050");
}

// --- S5: world violation ---

#[test]
fn s5_const_of_runtime_var_fails() {
    let source = "\
x := 1
x = x + 1
const k = x
";
    let failure = compile(source).expect_err("runtime value in const position");
    assert_eq!(sema_code(&failure), "E2020");
}

// --- S6: unclosed string position ---

#[test]
fn s6_unclosed_quote_points_at_open_quote() {
    let failure = compile("s = \"hello").expect_err("unclosed string");
    match &failure.error {
        CompileError::Lexer(acacia::errors::LexerError::UnclosedQuote { span }) => {
            assert_eq!(span.offset(), 4, "span starts at the opening quote");
        }
        other => panic!("expected UnclosedQuote, got {other:?}"),
    }
}

// --- Property 4/5: folding selects branches statically ---

#[test]
fn const_if_emits_only_selected_branch() {
    let source = "\
const DEBUG = False
if DEBUG:
    /say debugging
else:
    /say released
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    assert!(main.contains("say released"));
    assert!(!main.contains("say debugging"));
    // The unselected branch leaves no internal file behind either
    for (path, text) in output.text_files() {
        assert!(
            !text.contains("say debugging"),
            "dead branch leaked into {path}"
        );
    }
}

#[test]
fn endless_const_while_is_rejected() {
    let failure = compile("while True:\n    /say forever\n").expect_err("endless loop");
    assert_eq!(sema_code(&failure), "E2032");
}

// --- Property 6: raw command interpolation ---

#[test]
fn command_interpolation_renders_constant() {
    let source = "\
const BLOCK = \"minecraft:stone\"
/setblock 0 64 0 ${BLOCK}
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    let hits: Vec<&str> = main
        .lines()
        .filter(|l| *l == "setblock 0 64 0 minecraft:stone")
        .collect();
    assert_eq!(hits.len(), 1);
}

// --- Property 7: idempotence ---

#[test]
fn recompilation_is_byte_identical() {
    let source = "\
x := 3
while x > 0:
    x -= 1
    /say tick
if x == 0:
    /say done
";
    let first = compile_ok(source).text_files();
    let second = compile_ok(source).text_files();
    assert_eq!(first, second);
}

// --- Runtime control flow through the interpreter ---

#[test]
fn while_loop_counts_correctly() {
    let source = "\
i := 0
total := 0
while i < 5:
    i += 1
    total += i
";
    let output = compile_ok(source);
    let mut sim = Sim::load(&output);
    sim.run("init");
    sim.run("main");
    // i is the first allocated slot, total the second
    assert_eq!(sim.get("acacia1", "acacia"), 5);
    assert_eq!(sim.get("acacia2", "acacia"), 15);
}

#[test]
fn runtime_if_else_picks_one_branch() {
    let source = "\
x := 7
a := 0
b := 0
if x > 5:
    a = 1
else:
    b = 1
";
    let output = compile_ok(source);
    let mut sim = Sim::load(&output);
    sim.run("init");
    sim.run("main");
    assert_eq!(sim.get("acacia2", "acacia"), 1, "then branch taken");
    assert_eq!(sim.get("acacia3", "acacia"), 0, "else branch skipped");
}

#[test]
fn compare_chain_lowers_as_conjunction() {
    let source = "\
x := 4
ok := 1 < x <= 10
";
    let output = compile_ok(source);
    let mut sim = Sim::load(&output);
    sim.run("init");
    sim.run("main");
    assert_eq!(sim.get("acacia2", "acacia"), 1);
}

// --- Functions ---

#[test]
fn inline_function_expands_at_call_site() {
    let source = "\
inline def bump(&target: int, const amount: int):
    target += amount

x := 10
bump(x, 5)
";
    let output = compile_ok(source);
    let mut sim = Sim::load(&output);
    sim.run("init");
    sim.run("main");
    assert_eq!(sim.get("acacia1", "acacia"), 15);
}

#[test]
fn const_function_folds_entirely() {
    let source = "\
const def double(x: int):
    result x * 2

y = double(21)
";
    let output = compile_ok(source);
    let init = output.file_text("init").unwrap();
    assert!(init.contains("scoreboard players set acacia1 acacia 42"));
}

#[test]
fn const_function_rejects_runtime_argument() {
    let source = "\
const def double(x: int):
    result x * 2

r := 5
y := double(r)
";
    let failure = compile(source).expect_err("runtime arg to const fn");
    assert_eq!(sema_code(&failure), "E2022");
}

#[test]
fn reference_argument_requires_assignable() {
    let source = "\
inline def bump(&target: int):
    target += 1

bump(1 + 2)
";
    let failure = compile(source).expect_err("literal is not assignable");
    assert_eq!(sema_code(&failure), "E2026");
}

// --- Entities ---

#[test]
fn entity_instantiation_summons_and_tags() {
    let source = "\
entity Marker:
    @type: \"minecraft:armor_stand\"
    hp: int

    def new():
        new()

m := Marker()
m.hp = 10
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    assert!(
        main.contains("summon minecraft:armor_stand"),
        "summon emitted:\n{main}"
    );
    // identity tag + instance tag
    let tag_adds = main.lines().filter(|l| l.starts_with("tag ")).count();
    assert!(tag_adds >= 2, "identity and instance tags:\n{main}");
    // the field assignment targets the entity selector
    assert!(
        main.lines()
            .any(|l| l.starts_with("scoreboard players set @e[tag=") && l.ends_with(" 10")),
        "field write goes through the entity selector:\n{main}"
    );
}

#[test]
fn virtual_dispatch_emits_tag_guarded_lines() {
    let source = "\
entity Base:
    virtual def speak():
        /say base

entity Loud(Base):
    override def speak():
        /say loud

b := Base()
b.speak()
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    let dispatch: Vec<&str> = main
        .lines()
        .filter(|l| l.starts_with("execute as @e[tag=") && l.contains(" run function "))
        .collect();
    assert_eq!(
        dispatch.len(),
        2,
        "one guarded line per concrete template:\n{main}"
    );
    // Each guarded selector carries the instance tag plus a template tag
    for line in dispatch {
        assert!(line.matches("tag=").count() >= 2, "tag-guarded: {line}");
    }
}

#[test]
fn virtual_ref_parameter_copies_back_from_dispatched_override() {
    let source = "\
entity Base:
    virtual def grab(&out: int):
        out = 1

entity Loud(Base):
    override def grab(&out: int):
        out = 2

b: Base = Loud()
x := 0
b.grab(x)
";
    let output = compile_ok(source);
    let mut sim = Sim::load(&output);
    sim.run("init");
    sim.run("main");
    // The instance is a Loud viewed through a Base-typed variable, and
    // Loud's implementation is not the first one compiled: the write
    // back to x must still come from the override that actually ran.
    assert_eq!(sim.get("acacia3", "acacia"), 2);
}

#[test]
fn unrelated_inherited_virtuals_are_rejected() {
    let source = "\
entity A:
    virtual def ping():
        /say a

entity B:
    virtual def ping():
        /say b

entity C(A, B):
    pass
";
    let failure = compile(source).expect_err("two unrelated virtual roots");
    assert_eq!(sema_code(&failure), "E2055");
}

#[test]
fn diamond_overrides_of_one_root_merge() {
    let source = "\
entity A:
    virtual def ping():
        /say a

entity B(A):
    override def ping():
        /say b

entity C(A):
    override def ping():
        /say c

entity D(B, C):
    pass
";
    compile_ok(source);
}

#[test]
fn override_result_mismatch_is_rejected() {
    let source = "\
entity Base:
    virtual def hit() -> int:
        result 1

entity Bad(Base):
    override def hit() -> bool:
        result True
";
    let failure = compile(source).expect_err("result type mismatch");
    assert_eq!(sema_code(&failure), "E2056");
}

#[test]
fn new_outside_new_method_is_rejected() {
    let failure = compile("new()\n").expect_err("new out of scope");
    assert_eq!(sema_code(&failure), "E2034");
}

// --- Interfaces ---

#[test]
fn interface_compiles_to_its_own_path() {
    let source = "\
interface game.start:
    /say starting
";
    let output = compile_ok(source);
    let text = output.file_text("game/start").unwrap();
    assert!(text.contains("say starting"));
}

#[test]
fn reserved_interface_path_is_rejected() {
    let failure = compile("interface main:\n    /say no\n").expect_err("reserved path");
    use miette::Diagnostic;
    assert_eq!(failure.error.code().unwrap().to_string(), "E3001");
}

#[test]
fn duplicate_interface_is_rejected() {
    let source = "\
interface a.b:
    /say one
interface a.b:
    /say two
";
    let failure = compile(source).expect_err("duplicate path");
    use miette::Diagnostic;
    assert_eq!(failure.error.code().unwrap().to_string(), "E3002");
}

// --- Groups and filters ---

#[test]
fn group_select_through_filter_stages() {
    let source = "\
entity Cow:
    @type: \"minecraft:cow\"

herd := Engroup[Cow]()
herd.select(Enfilter().is_type(\"minecraft:cow\").distance_from(Pos(0, 64, 0), max=10.0))
n := herd.size()
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    assert!(
        main.lines().any(|l| l.contains("tag ") && l.contains(" add ")),
        "selection tags members:\n{main}"
    );
    assert!(
        main.contains("execute positioned 0 64 0"),
        "distance stage anchors at the position:\n{main}"
    );
    assert!(
        main.lines()
            .any(|l| l.starts_with("execute as @e[tag=") && l.ends_with("add acacia3 acacia 1")
                || l.contains("scoreboard players add")),
        "size counts members:\n{main}"
    );
}

// --- Strings ---

#[test]
fn font_escapes_become_section_codes() {
    let source = "\
import print
print.tell(\"\\f{bold}hi\\f{}\")
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    assert!(main.contains("\u{00a7}l"), "bold code:\n{main}");
    assert!(main.contains("\u{00a7}r"), "reset code:\n{main}");
}

#[test]
fn formatted_string_with_const_holes_folds_to_text() {
    let source = "\
const WHO = \"world\"
s := \"hello {WHO}\"
const check = s + \"!\"
";
    compile_ok(source);
}

// --- Modules ---

#[test]
fn unknown_module_reports_not_found() {
    let failure = compile("import nosuchmodule\n").expect_err("unknown module");
    use miette::Diagnostic;
    assert_eq!(failure.error.code().unwrap().to_string(), "E3003");
}

#[test]
fn world_fill_uses_documented_keywords() {
    let source = "\
import world
world.fill(from=Pos(0, 64, 0), offset=Offset(4, 0, 4), block=\"minecraft:stone\")
world.setblock(Pos(1, 64, 1), \"minecraft:glass\")
";
    let output = compile_ok(source);
    let main = output.file_text("main").unwrap();
    assert!(
        main.contains("execute positioned 0 64 0 run fill ~ ~ ~ ~4 ~ ~4 minecraft:stone"),
        "fill anchors at `from` and spans `offset`:\n{main}"
    );
    assert!(
        main.contains("execute positioned 1 64 1 run setblock ~ ~ ~ minecraft:glass"),
        "setblock anchors at its position:\n{main}"
    );
}

#[test]
fn math_min_max_lower_to_operations() {
    let source = "\
import math
a := 3
b := math.min(a, 10)
c := math.max(a, 10)
";
    let output = compile_ok(source);
    let mut sim = Sim::load(&output);
    sim.run("init");
    sim.run("main");
    assert_eq!(sim.get("acacia1", "acacia"), 3);
    // b and c land in later slots; check via the operations emitted
    let main = output.file_text("main").unwrap();
    assert!(main.contains(" < "), "min operation:\n{main}");
    assert!(main.contains(" > "), "max operation:\n{main}");
}
