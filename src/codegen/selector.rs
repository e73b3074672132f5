// src/codegen/selector.rs
//! Target selector builder and the staged entity filter.
//!
//! A single `@e[...]` selector cannot express every filter chain (only
//! one limit, one anchor position). Filters therefore run as stages:
//! each stage that needs its own selector tags the survivors with a
//! temporary tag that the next stage starts from, and cleanup commands
//! drop the temporaries afterwards.

use smallvec::SmallVec;

use crate::codegen::alloc::Allocator;
use crate::codegen::cmds::{Command, ExecuteSub, mc_str};

/// Builder for one `@<var>[arg, ...]` selector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McSelector {
    var: Option<char>,
    args: Vec<(String, String)>,
}

impl McSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(var: char) -> Self {
        Self {
            var: Some(var),
            args: Vec::new(),
        }
    }

    /// `@e[tag=<t>]`
    pub fn tagged(tag: &str) -> Self {
        let mut sel = Self::with_var('e');
        sel.tag(tag);
        sel
    }

    pub fn is_var_set(&self) -> bool {
        self.var.is_some()
    }

    pub fn set_var(&mut self, var: char) {
        self.var = Some(var);
    }

    pub fn has_arg(&self, key: &str) -> bool {
        self.args.iter().any(|(k, _)| k == key)
    }

    fn push(&mut self, key: &str, value: String) {
        self.args.push((key.to_string(), value));
    }

    pub fn tag(&mut self, tag: &str) {
        self.push("tag", mc_str(tag));
    }

    pub fn tag_n(&mut self, tag: &str) {
        self.push("tag", format!("!{}", mc_str(tag)));
    }

    pub fn entity_type(&mut self, ty: &str) {
        self.push("type", ty.to_string());
    }

    pub fn entity_type_n(&mut self, ty: &str) {
        self.push("type", format!("!{}", ty));
    }

    pub fn name(&mut self, name: &str) {
        self.push("name", mc_str(name));
    }

    pub fn name_n(&mut self, name: &str) {
        self.push("name", format!("!{}", mc_str(name)));
    }

    /// Selection limit; negative selects from the far end.
    pub fn limit(&mut self, limit: i32) {
        self.push("c", limit.to_string());
    }

    pub fn distance(&mut self, min: Option<f64>, max: Option<f64>) {
        if let Some(min) = min {
            self.push("rm", format_float(min));
        }
        if let Some(max) = max {
            self.push("r", format_float(max));
        }
    }

    pub fn volume(&mut self, dx: f64, dy: f64, dz: f64) {
        self.push("dx", format_float(dx));
        self.push("dy", format_float(dy));
        self.push("dz", format_float(dz));
    }

    pub fn scores(&mut self, objective: &str, range: &str) {
        self.push("scores", format!("{{{}={}}}", objective, range));
    }

    pub fn rot_vertical(&mut self, min: f64, max: f64) {
        self.push("rxm", format_float(min));
        self.push("rx", format_float(max));
    }

    pub fn rot_horizontal(&mut self, min: f64, max: f64) {
        self.push("rym", format_float(min));
        self.push("ry", format_float(max));
    }

    pub fn to_str(&self) -> String {
        let var = self.var.unwrap_or('e');
        if self.args.is_empty() {
            format!("@{}", var)
        } else {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("@{}[{}]", var, args.join(","))
        }
    }
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// One stage of a filter pipeline. `tag` is the temporary handed to
/// the next stage (None for the final stage).
#[derive(Debug, Clone, PartialEq)]
struct FilterStage {
    tag: Option<String>,
    subcmds: SmallVec<[ExecuteSub; 2]>,
    selector: McSelector,
}

/// Composable, compile-time entity predicate. Immutable from the
/// language's view: every filter method clones and extends.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFilter {
    stages: Vec<FilterStage>,
    context_occupied: bool,
    next_use_new_stage: bool,
    cleanup: Vec<Command>,
    pub entity_type: Option<String>,
}

impl Default for EntityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityFilter {
    pub fn new() -> Self {
        let mut filter = Self {
            stages: Vec::new(),
            context_occupied: false,
            next_use_new_stage: false,
            cleanup: Vec::new(),
            entity_type: None,
        };
        filter.new_stage_no_alloc();
        filter
    }

    fn new_stage_no_alloc(&mut self) {
        self.stages.push(FilterStage {
            tag: None,
            subcmds: SmallVec::new(),
            selector: McSelector::new(),
        });
        self.context_occupied = false;
        self.next_use_new_stage = false;
    }

    fn new_stage(&mut self, alloc: &mut Allocator) {
        if !self.stages.is_empty() {
            let tag = alloc.tag();
            self.stages.last_mut().unwrap().tag = Some(tag.clone());
            self.cleanup.push(Command::TagRemove {
                target: format!("@e[tag={}]", mc_str(&tag)),
                tag,
            });
        }
        self.new_stage_no_alloc();
    }

    /// Selector whose variable must be set; starts a new stage when the
    /// current one already has its variable.
    pub fn need_set_selector_var(&mut self, var: char, alloc: &mut Allocator) -> &mut McSelector {
        if self.stages.last().unwrap().selector.is_var_set() {
            self.new_stage(alloc);
        }
        let sel = &mut self.stages.last_mut().unwrap().selector;
        sel.set_var(var);
        sel
    }

    /// Attach execution context (positioned/rotated) to the current
    /// stage; starts a new one when a context is already present.
    pub fn need_set_context(
        &mut self,
        context: Vec<ExecuteSub>,
        alloc: &mut Allocator,
    ) -> &mut McSelector {
        if self.context_occupied {
            self.new_stage(alloc);
        }
        let stage = self.stages.last_mut().unwrap();
        stage.subcmds.extend(context);
        self.context_occupied = true;
        &mut stage.selector
    }

    pub fn last_selector(&mut self, alloc: &mut Allocator) -> &mut McSelector {
        if self.next_use_new_stage {
            self.new_stage(alloc);
        }
        &mut self.stages.last_mut().unwrap().selector
    }

    /// Like `last_selector` but starts a new stage when any of the
    /// given selector arguments are already present.
    pub fn new_if_got(&mut self, keys: &[&str], alloc: &mut Allocator) -> &mut McSelector {
        let occupied = {
            let sel = &self.stages.last().unwrap().selector;
            keys.iter().any(|k| sel.has_arg(k))
        };
        if occupied || self.next_use_new_stage {
            self.new_stage(alloc);
        }
        &mut self.stages.last_mut().unwrap().selector
    }

    /// Force the following constraint onto a fresh stage (used after
    /// `random`/`nearest_from`, whose limits must not be merged with
    /// later constraints).
    pub fn seal_stage(&mut self) {
        self.next_use_new_stage = true;
    }

    /// Emit the pipeline. `command` contains a `{selected}`
    /// placeholder for the final selector. When `among_tag` is given
    /// the filter starts from entities carrying that tag.
    pub fn dump(&self, command: &str, among_tag: Option<&str>) -> Vec<Command> {
        let mut out = Vec::new();
        let mut last_tag = among_tag.map(str::to_string);
        let (final_stage, head) = self.stages.split_last().unwrap();
        for stage in head {
            let mut selector = stage.selector.clone();
            if let Some(tag) = &last_tag {
                selector.tag(tag);
            }
            let stage_tag = stage.tag.as_ref().expect("non-final stage has a tag");
            out.push(Command::execute(
                stage.subcmds.to_vec(),
                Command::TagAdd {
                    target: selector.to_str(),
                    tag: stage_tag.clone(),
                },
            ));
            last_tag = Some(stage_tag.clone());
        }
        let mut selector = final_stage.selector.clone();
        if let Some(tag) = &last_tag {
            selector.tag(tag);
        }
        out.push(Command::execute(
            final_stage.subcmds.to_vec(),
            Command::Raw(command.replace("{selected}", &selector.to_str())),
        ));
        out.extend(self.cleanup.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc() -> Allocator {
        Allocator::new("acacia", "acacia_", "_acacia")
    }

    #[test]
    fn selector_renders_args_in_order() {
        let mut sel = McSelector::with_var('e');
        sel.entity_type("minecraft:cow");
        sel.tag("herd");
        sel.limit(3);
        assert_eq!(sel.to_str(), "@e[type=minecraft:cow,tag=herd,c=3]");
    }

    #[test]
    fn selector_without_args() {
        assert_eq!(McSelector::with_var('a').to_str(), "@a");
    }

    #[test]
    fn negated_args() {
        let mut sel = McSelector::with_var('e');
        sel.tag_n("done");
        sel.entity_type_n("minecraft:armor_stand");
        assert_eq!(sel.to_str(), "@e[tag=!done,type=!minecraft:armor_stand]");
    }

    #[test]
    fn distance_uses_rm_r() {
        let mut sel = McSelector::with_var('e');
        sel.distance(Some(1.5), Some(10.0));
        assert_eq!(sel.to_str(), "@e[rm=1.5,r=10]");
    }

    #[test]
    fn single_stage_filter_dumps_one_command() {
        let mut alloc = alloc();
        let mut f = EntityFilter::new();
        f.last_selector(&mut alloc).entity_type("minecraft:cow");
        let cmds = f.dump("tag {selected} add herd", None);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].resolve(), "tag @e[type=minecraft:cow] add herd");
    }

    #[test]
    fn staged_filter_chains_through_temp_tags() {
        let mut alloc = alloc();
        let mut f = EntityFilter::new();
        // random-style constraint, then a further tag constraint
        {
            let sel = f.need_set_selector_var('r', &mut alloc);
            sel.entity_type("minecraft:cow");
            sel.limit(5);
        }
        f.seal_stage();
        f.last_selector(&mut alloc).tag("alive");
        let cmds = f.dump("tag {selected} add picked", None);
        // stage 1 tags, stage 2 selects, cleanup removes the temp tag
        assert_eq!(cmds.len(), 3);
        assert_eq!(
            cmds[0].resolve(),
            "tag @r[type=minecraft:cow,c=5] add acacia_1"
        );
        assert_eq!(
            cmds[1].resolve(),
            "tag @e[tag=alive,tag=acacia_1] add picked"
        );
        assert_eq!(
            cmds[2].resolve(),
            "tag @e[tag=acacia_1] remove acacia_1"
        );
    }

    #[test]
    fn among_tag_narrows_first_stage() {
        let mut alloc = alloc();
        let mut f = EntityFilter::new();
        f.last_selector(&mut alloc).name("Bessie");
        let cmds = f.dump("tag {selected} add found", Some("herd"));
        assert_eq!(
            cmds[0].resolve(),
            "tag @e[name=Bessie,tag=herd] add found"
        );
    }

    #[test]
    fn context_stage_prepends_execute() {
        let mut alloc = alloc();
        let mut f = EntityFilter::new();
        let sel = f.need_set_context(
            vec![ExecuteSub::env("positioned", "0 64 0")],
            &mut alloc,
        );
        sel.distance(None, Some(8.0));
        let cmds = f.dump("tag {selected} add near", None);
        assert_eq!(
            cmds[0].resolve(),
            "execute positioned 0 64 0 run tag @e[r=8] add near"
        );
    }
}
