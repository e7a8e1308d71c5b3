//! Makefile rendering for [`BuildGraph`]s.

use super::{BuildGraph, GraphItem, Rule};

/// Render `graph` as a GNU Makefile.
pub fn render_makefile(graph: &BuildGraph) -> String {
  let mut out: Vec<String> = graph.prelude.iter().map(render_item).collect();
  out.extend(graph.items.iter().map(render_item));
  let mut text = out.join("\n\n");
  text.push('\n');
  text
}

fn render_item(item: &GraphItem) -> String {
  match item {
    GraphItem::Raw { value } => value.clone(),
    GraphItem::Define { name, value } => format!("define {}\n{}\nendef", name, escape_env_var(value)),
    GraphItem::File { target, content } => render_file(target, content),
    GraphItem::Rule(rule) => render_rule(rule),
  }
}

fn render_rule(rule: &Rule) -> String {
  let mut text = rule.target.clone();
  text.push(':');
  for dep in &rule.dependencies {
    text.push(' ');
    text.push_str(dep);
  }

  if let Some(command) = &rule.command {
    text.push('\n');
    text.push_str(&recipe(&escape_env_var(command)));
  }
  text
}

fn render_file(target: &str, content: &str) -> String {
  let mut lines = vec!["mkdir -p $(@D)".to_string()];
  for (i, line) in content.lines().enumerate() {
    let redirect = if i == 0 { ">" } else { ">>" };
    let quoted = escape_env_var(&line.replace('\'', "'\\''"));
    lines.push(format!("echo '{}' {} $(@)", quoted, redirect));
  }
  format!("{}:\n{}", target, recipe(&lines.join("\n")))
}

fn recipe(command: &str) -> String {
  command
    .lines()
    .map(|line| format!("\t{}", line))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Escape shell variable references so make passes them through.
///
/// `$name` becomes `$$name`; make references such as `$(VAR)` are kept.
pub fn escape_env_var(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars().peekable();
  while let Some(c) = chars.next() {
    out.push(c);
    if c == '$'
      && let Some(&next) = chars.peek()
      && next != '('
    {
      out.push('$');
    }
  }
  out
}
