//! DOT rendering of a method graph.
//!
//! Each node becomes a Graphviz record listing its input ports, its id and operation, and
//! its output ports; each link becomes an edge between the two port fields. Blocks are drawn
//! as clusters and control-flow edges as dashed arrows from a terminator to the entry of
//! the successor, labelled with the successor index.

use std::fmt::Write;

use crate::graph::{BlockId, Graph, NodeId, PortId};

/// Escapes a string for use inside a quoted DOT record label.
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('|', "\\|")
}

fn field(port: PortId) -> String {
    match port {
        PortId::Env => "env".to_string(),
        PortId::Arg(n) => format!("a{n}"),
        PortId::Stack(n) => format!("s{n}"),
        PortId::Local(n) => format!("l{n}"),
    }
}

fn record(graph: &Graph, node: NodeId) -> String {
    let found = graph.node(node);
    let inputs: Vec<String> = found
        .inputs()
        .keys()
        .map(|port| format!("<i_{}> {port}", field(*port)))
        .collect();
    let outputs: Vec<String> = found
        .outputs()
        .keys()
        .map(|port| format!("<o_{}> {port}", field(*port)))
        .collect();
    format!(
        "{{{{{}}}|{node}: {}|{{{}}}}}",
        inputs.join("|"),
        escape_dot(&found.op().to_string()),
        outputs.join("|")
    )
}

/// Renders every block reachable from `entry` as a DOT digraph.
#[must_use]
pub fn method_to_dot(graph: &Graph, entry: BlockId) -> String {
    let blocks = graph.method_blocks(entry);
    let mut out = String::new();

    let _ = writeln!(out, "digraph method {{");
    let _ = writeln!(out, "  node [shape=record, fontname=\"monospace\"];");

    for block in &blocks {
        let found = graph.block(*block);
        let _ = writeln!(out, "  subgraph cluster_{} {{", block.index());
        match found.offset() {
            Some(offset) => {
                let _ = writeln!(out, "    label=\"{block} @ {offset}\";");
            }
            None => {
                let _ = writeln!(out, "    label=\"{block} (init)\";");
            }
        }
        for node in found.nodes() {
            let _ = writeln!(out, "    {node} [label=\"{}\"];", record(graph, *node));
        }
        let _ = writeln!(out, "  }}");
    }

    for block in &blocks {
        for node in graph.block(*block).nodes() {
            for (port, input) in graph.inputs(*node) {
                let Some(source) = graph.source(*input) else {
                    continue;
                };
                let producer = graph.output_port(source);
                let _ = writeln!(
                    out,
                    "  {}:o_{} -> {node}:i_{};",
                    producer.node(),
                    field(producer.port()),
                    field(*port)
                );
            }
        }
    }

    for block in &blocks {
        let found = graph.block(*block);
        let Some(terminator) = found.terminator() else {
            continue;
        };
        for (index, successor) in found.successors().iter().enumerate() {
            let _ = writeln!(
                out,
                "  {terminator} -> {} [style=dashed, label=\"{index}\"];",
                graph.block(*successor).entry()
            );
        }
    }

    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Operation;

    #[test]
    fn test_escape_dot() {
        assert_eq!(escape_dot("hello"), "hello");
        assert_eq!(escape_dot("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_dot("List<T>"), "List\\<T\\>");
        assert_eq!(escape_dot("a\r\nb"), "a\\nb");
        assert_eq!(escape_dot("{a|b}"), "\\{a\\|b\\}");
    }

    #[test]
    fn test_method_to_dot() {
        let mut graph = Graph::new();
        let first = graph.new_block(Operation::BlockEntry, Some(0));
        let second = graph.new_block(Operation::BlockEntry, Some(3));

        let jump = graph.create_node(Operation::Jump, Some(first));
        let env = graph.output(graph.block(first).entry(), PortId::Env);
        graph.add_input(jump, PortId::Env, env);
        graph.set_terminator(first, jump, vec![second]);

        let ret = graph.create_node(Operation::Return(None), Some(second));
        let env = graph.output(graph.block(second).entry(), PortId::Env);
        graph.add_input(ret, PortId::Env, env);
        graph.set_terminator(second, ret, Vec::new());

        let dot = method_to_dot(&graph, first);
        assert!(dot.starts_with("digraph method {"));
        assert!(dot.contains("cluster_0"));
        assert!(dot.contains("cluster_1"));
        assert!(dot.contains(&format!("{jump}: jump")));
        assert!(dot.contains(&format!(
            "{}:o_env -> {jump}:i_env;",
            graph.block(first).entry()
        )));
        assert!(dot.contains("[style=dashed, label=\"0\"]"));
    }
}
