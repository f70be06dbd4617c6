//! Grafo de dependencias entre steps.
//!
//! Se deriva de los nombres declarados: `A -> B` si `B` consume un artifact
//! que `A` produce. La construcción falla antes de ejecutar nada si hay
//! outputs duplicados, inputs sin productor o ciclos.
//!
//! El orden topológico es determinista: Kahn con cola de prioridad por índice
//! de declaración (y nombre como desempate), así dos builds con las mismas
//! declaraciones producen el mismo orden.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use indexmap::IndexMap;

use crate::errors::GraphError;
use crate::step::Step;

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    producer: IndexMap<String, usize>,
    externals: BTreeSet<String>,
    upstream: Vec<Vec<usize>>,
    downstream: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Construye el DAG a partir de los steps (en orden de declaración) y los
    /// artifacts suministrados externamente.
    pub fn build<I, S>(steps: &[Step], external_inputs: I) -> Result<Self, GraphError>
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        let externals: BTreeSet<String> = external_inputs.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(steps.len());
        let mut producer: IndexMap<String, usize> = IndexMap::new();

        for (i, step) in steps.iter().enumerate() {
            step.validate()?;
            if index.insert(step.name().to_string(), i).is_some() {
                return Err(GraphError::DuplicateStep { name: step.name().to_string() });
            }
            for out in step.output_names() {
                if externals.contains(out) {
                    return Err(GraphError::ExternalConflict { artifact: out.clone(),
                                                              step: step.name().to_string() });
                }
                if let Some(&prev) = producer.get(out) {
                    return Err(GraphError::DuplicateOutput { artifact: out.clone(),
                                                             first: steps[prev].name().to_string(),
                                                             second: step.name().to_string() });
                }
                producer.insert(out.clone(), i);
            }
        }

        let mut upstream = vec![Vec::new(); steps.len()];
        let mut downstream = vec![Vec::new(); steps.len()];
        for (i, step) in steps.iter().enumerate() {
            for input in step.input_names() {
                match producer.get(input) {
                    Some(&p) => {
                        if !upstream[i].contains(&p) {
                            upstream[i].push(p);
                            downstream[p].push(i);
                        }
                    }
                    None if externals.contains(input) => {}
                    None => {
                        return Err(GraphError::UnresolvedInput { step: step.name().to_string(),
                                                                 artifact: input.clone() })
                    }
                }
            }
        }

        let order = topological_order(steps, &upstream, &downstream)?;
        Ok(Self { steps: steps.to_vec(),
                  index,
                  producer,
                  externals,
                  upstream,
                  downstream,
                  order })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps en orden topológico determinista.
    pub fn order(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().map(move |&i| &self.steps[i])
    }

    /// Nombres en orden topológico.
    pub fn order_names(&self) -> Vec<String> {
        self.order().map(|s| s.name().to_string()).collect()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    pub fn externals(&self) -> &BTreeSet<String> {
        &self.externals
    }

    pub fn is_external(&self, artifact: &str) -> bool {
        self.externals.contains(artifact)
    }

    /// Step que produce `artifact`, si lo produce alguno.
    pub fn producer_of(&self, artifact: &str) -> Option<&Step> {
        self.producer.get(artifact).map(|&i| &self.steps[i])
    }

    /// Productores directos de `step`.
    pub fn producers_of(&self, step: &str) -> Vec<&Step> {
        self.index
            .get(step)
            .map(|&i| self.upstream[i].iter().map(|&u| &self.steps[u]).collect())
            .unwrap_or_default()
    }

    /// Consumidores directos de `step`.
    pub fn consumers_of(&self, step: &str) -> Vec<&Step> {
        self.index
            .get(step)
            .map(|&i| self.downstream[i].iter().map(|&d| &self.steps[d]).collect())
            .unwrap_or_default()
    }

    /// Todos los steps de los que `step` depende transitivamente.
    pub fn upstream_closure(&self, step: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let Some(&start) = self.index.get(step) else { return seen };
        let mut stack = self.upstream[start].clone();
        while let Some(u) = stack.pop() {
            if seen.insert(self.steps[u].name().to_string()) {
                stack.extend(self.upstream[u].iter().copied());
            }
        }
        seen
    }

    pub(crate) fn step_at(&self, i: usize) -> &Step {
        &self.steps[i]
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn upstream_indices(&self, i: usize) -> &[usize] {
        &self.upstream[i]
    }

    pub(crate) fn downstream_indices(&self, i: usize) -> &[usize] {
        &self.downstream[i]
    }
}

fn topological_order(steps: &[Step], upstream: &[Vec<usize>], downstream: &[Vec<usize>]) -> Result<Vec<usize>, GraphError> {
    let mut indegree: Vec<usize> = upstream.iter().map(Vec::len).collect();
    // Min-heap por (índice de declaración, nombre).
    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = indegree.iter()
                                                                 .enumerate()
                                                                 .filter(|(_, d)| **d == 0)
                                                                 .map(|(i, _)| Reverse((i, steps[i].name())))
                                                                 .collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(Reverse((i, _))) = ready.pop() {
        order.push(i);
        for &d in &downstream[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.push(Reverse((d, steps[d].name())));
            }
        }
    }
    if order.len() == steps.len() {
        return Ok(order);
    }
    let remaining: HashSet<usize> = (0..steps.len()).filter(|i| indegree[*i] > 0).collect();
    Err(GraphError::Cycle { steps: find_cycle(steps, upstream, &remaining) })
}

/// Devuelve los nombres (ordenados) de un ciclo dentro de `remaining`.
///
/// Todo nodo que Kahn no pudo ordenar tiene al menos un productor también
/// restante, así que recorrer productores desde cualquiera termina
/// repitiendo un nodo: el tramo desde la primera aparición es el ciclo.
fn find_cycle(steps: &[Step], upstream: &[Vec<usize>], remaining: &HashSet<usize>) -> Vec<String> {
    let Some(&start) = remaining.iter().min() else { return Vec::new() };
    let mut path: Vec<usize> = Vec::new();
    let mut pos: HashMap<usize, usize> = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&at) = pos.get(&current) {
            let mut names: Vec<String> = path[at..].iter().map(|&i| steps[i].name().to_string()).collect();
            names.sort();
            return names;
        }
        pos.insert(current, path.len());
        path.push(current);
        match upstream[current].iter().copied().filter(|u| remaining.contains(u)).min() {
            Some(next) => current = next,
            None => return vec![steps[current].name().to_string()],
        }
    }
}
