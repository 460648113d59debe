//! Stage chain arena, waypoint registry, and the textual chain dump.
//!
//! Stages live in a `Vec` arena and reference each other by index, so the
//! chain serializes trivially and carries no ownership cycles. A chain is
//! built stage by stage in signal-flow order; two chains are stitched with
//! [`Chain::join`], the single attachment point where the downstream
//! chain's head gets the upstream chain's tail as parent.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::range::Scale;
use crate::geometry::stage::{Resample, Stage, StageId, StageSpec};

/// Symbolic role of a chain cut point, addressable without a stage index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waypoint {
    /// Raw sample grid entering the MFCC stage.
    SampleInput,
    /// Mel/MFCC frame grid entering the encoder stack.
    MelInput,
    /// Latent frame grid leaving the encoder stack.
    EncoderOutput,
    /// Sample-rate conditioning grid leaving the upsampling stack.
    UpsampleOutput,
    /// Sample grid entering the dilated decoder stack.
    DilatedInput,
    /// Sample grid leaving the dilated decoder stack.
    DilatedOutput,
    /// Final prediction grid.
    Prediction,
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Waypoint::SampleInput => "sample_input",
            Waypoint::MelInput => "mel_input",
            Waypoint::EncoderOutput => "encoder_output",
            Waypoint::UpsampleOutput => "upsample_output",
            Waypoint::DilatedInput => "dilated_input",
            Waypoint::DilatedOutput => "dilated_output",
            Waypoint::Prediction => "prediction",
        };
        f.write_str(name)
    }
}

/// A grid between stages: before the first stage or after stage `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutPoint {
    Source,
    After(StageId),
}

/// Linear chain of stages with a waypoint registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chain {
    pub(crate) stages: Vec<Stage>,
    head: Option<StageId>,
    tail: Option<StageId>,
    waypoints: HashMap<Waypoint, CutPoint>,
}

impl Chain {
    pub fn new() -> Self {
        Chain::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id)
    }

    pub fn head(&self) -> Option<StageId> {
        self.head
    }

    pub fn tail(&self) -> Option<StageId> {
        self.tail
    }

    /// Append a stage, linking it to the current tail.
    pub fn push(&mut self, spec: StageSpec) -> Result<StageId> {
        let id = self.stages.len();
        let mut stage = Stage::from_spec(id, spec)?;
        stage.parent = self.tail;
        if let Some(tail) = self.tail {
            self.stages[tail].child = Some(id);
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        debug!(stage = %stage, id, "chain: appended stage");
        self.stages.push(stage);
        Ok(id)
    }

    /// Register a waypoint at a cut point. Each waypoint is registered once.
    pub fn tag(&mut self, waypoint: Waypoint, cut: CutPoint) -> Result<()> {
        if let CutPoint::After(id) = cut {
            if id >= self.stages.len() {
                return Err(Error::invariant(format!(
                    "waypoint {waypoint} refers to missing stage {id}"
                )));
            }
        }
        if self.waypoints.insert(waypoint, cut).is_some() {
            return Err(Error::invariant(format!(
                "waypoint {waypoint} registered twice"
            )));
        }
        Ok(())
    }

    /// Register a waypoint at the grid after the current tail stage.
    pub fn tag_tail(&mut self, waypoint: Waypoint) -> Result<()> {
        match self.tail {
            Some(id) => self.tag(waypoint, CutPoint::After(id)),
            None => self.tag(waypoint, CutPoint::Source),
        }
    }

    pub fn waypoint(&self, waypoint: Waypoint) -> Option<CutPoint> {
        self.waypoints.get(&waypoint).copied()
    }

    pub(crate) fn resolve(&self, waypoint: Waypoint) -> Result<CutPoint> {
        self.waypoint(waypoint).ok_or_else(|| {
            Error::invariant(format!("waypoint {waypoint} is not registered\n{}", self.dump()))
        })
    }

    /// Stitch `back` onto `front`, re-indexing `back`'s arena and linking
    /// its head stage to `front`'s tail. `back`'s source-grid waypoints are
    /// remapped onto the attachment cut.
    pub fn join(front: Chain, back: Chain) -> Result<Chain> {
        let mut chain = front;
        if back.is_empty() {
            for (waypoint, _) in back.waypoints {
                let cut = chain.tail.map(CutPoint::After).unwrap_or(CutPoint::Source);
                chain.tag(waypoint, cut)?;
            }
            return Ok(chain);
        }
        let offset = chain.stages.len();
        let attach = chain.tail;
        for mut stage in back.stages {
            stage.id += offset;
            stage.parent = stage.parent.map(|p| p + offset).or(attach);
            stage.child = stage.child.map(|c| c + offset);
            chain.stages.push(stage);
        }
        let back_head = back.head.map(|h| h + offset);
        if let (Some(tail), Some(head)) = (attach, back_head) {
            chain.stages[tail].child = Some(head);
        }
        if chain.head.is_none() {
            chain.head = back_head;
        }
        chain.tail = back.tail.map(|t| t + offset);
        for (waypoint, cut) in back.waypoints {
            let cut = match cut {
                CutPoint::Source => attach.map(CutPoint::After).unwrap_or(CutPoint::Source),
                CutPoint::After(id) => CutPoint::After(id + offset),
            };
            chain.tag(waypoint, cut)?;
        }
        Ok(chain)
    }

    /// Stage ids strictly between the two cuts, in signal-flow order.
    /// Identical cuts denote the empty span.
    pub(crate) fn span(&self, from: CutPoint, to: CutPoint) -> Result<Vec<StageId>> {
        if from == to {
            return Ok(Vec::new());
        }
        let mut cur = match from {
            CutPoint::Source => self.head,
            CutPoint::After(id) => {
                self.stages
                    .get(id)
                    .ok_or_else(|| Error::invariant(format!("cut after missing stage {id}")))?
                    .child
            }
        };
        let mut span = Vec::new();
        while let Some(id) = cur {
            span.push(id);
            if CutPoint::After(id) == to {
                return Ok(span);
            }
            cur = self.stages[id].child;
        }
        Err(Error::invariant(format!(
            "cut {to:?} is not downstream of {from:?}\n{}",
            self.dump()
        )))
    }

    /// Stage ids in signal-flow order, following child links from the head.
    pub fn order(&self) -> Vec<StageId> {
        let mut order = Vec::with_capacity(self.stages.len());
        let mut cur = self.head;
        while let Some(id) = cur {
            order.push(id);
            cur = self.stages[id].child;
        }
        order
    }

    /// Compounded scale of the grid at a cut, relative to the source grid.
    pub fn scale_at(&self, cut: CutPoint) -> Result<Scale> {
        let mut scale = Scale::unit();
        for id in self.span(CutPoint::Source, cut)? {
            scale = match self.stages[id].resample() {
                Resample::Down(s) => scale.times(s as u64),
                Resample::Up(u) => scale.over(u as u64),
            };
        }
        Ok(scale)
    }

    fn waypoints_at(&self, cut: CutPoint) -> Vec<Waypoint> {
        let mut tags: Vec<Waypoint> = self
            .waypoints
            .iter()
            .filter(|(_, c)| **c == cut)
            .map(|(w, _)| *w)
            .collect();
        tags.sort_by_key(|w| w.to_string());
        tags
    }

    /// Human-readable stage table. One line per stage with the compounded
    /// scale and any waypoints registered at the grid after it.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut line = format!("{:<56} scale=1", "source");
        for waypoint in self.waypoints_at(CutPoint::Source) {
            line.push_str(&format!("  <- {waypoint}"));
        }
        out.push_str(&line);
        out.push('\n');
        let mut scale = Scale::unit();
        for id in self.order() {
            let stage = &self.stages[id];
            scale = match stage.resample() {
                Resample::Down(s) => scale.times(s as u64),
                Resample::Up(u) => scale.over(u as u64),
            };
            let mut line = format!("{:<56} scale={scale}", stage.to_string());
            for waypoint in self.waypoints_at(CutPoint::After(id)) {
                line.push_str(&format!("  <- {waypoint}"));
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked(chain: &Chain) -> Vec<(Option<StageId>, Option<StageId>)> {
        chain
            .order()
            .into_iter()
            .map(|id| {
                let s = chain.stage(id).unwrap();
                (s.parent(), s.child())
            })
            .collect()
    }

    #[test]
    fn test_push_links_stages() {
        let mut chain = Chain::new();
        chain.push(StageSpec::conv(3, 1).named("a")).unwrap();
        chain.push(StageSpec::conv(3, 1).named("b")).unwrap();
        chain.push(StageSpec::conv(4, 2).named("c")).unwrap();
        assert_eq!(chain.order(), vec![0, 1, 2]);
        assert_eq!(
            linked(&chain),
            vec![(None, Some(1)), (Some(0), Some(2)), (Some(1), None)]
        );
    }

    #[test]
    fn test_join_attaches_and_remaps() {
        let mut front = Chain::new();
        front.tag_tail(Waypoint::SampleInput).unwrap();
        front.push(StageSpec::conv(3, 1).named("enc")).unwrap();
        front.tag_tail(Waypoint::EncoderOutput).unwrap();

        let mut back = Chain::new();
        back.tag_tail(Waypoint::DilatedInput).unwrap();
        back.push(StageSpec::dilated(2, 1).named("dec")).unwrap();
        back.tag_tail(Waypoint::Prediction).unwrap();

        let chain = Chain::join(front, back).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.stage(1).unwrap().parent(), Some(0));
        assert_eq!(chain.stage(0).unwrap().child(), Some(1));
        // The back chain's source waypoint lands on the attachment cut.
        assert_eq!(chain.waypoint(Waypoint::DilatedInput), Some(CutPoint::After(0)));
        assert_eq!(chain.waypoint(Waypoint::EncoderOutput), Some(CutPoint::After(0)));
        assert_eq!(chain.waypoint(Waypoint::Prediction), Some(CutPoint::After(1)));
    }

    #[test]
    fn test_span_endpoints() {
        let mut chain = Chain::new();
        for _ in 0..4 {
            chain.push(StageSpec::conv(3, 1)).unwrap();
        }
        assert!(chain
            .span(CutPoint::After(1), CutPoint::After(1))
            .unwrap()
            .is_empty());
        assert_eq!(
            chain.span(CutPoint::Source, CutPoint::After(3)).unwrap(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(
            chain.span(CutPoint::After(0), CutPoint::After(2)).unwrap(),
            vec![1, 2]
        );
        assert!(chain.span(CutPoint::After(2), CutPoint::After(0)).is_err());
        assert!(chain.span(CutPoint::After(2), CutPoint::Source).is_err());
    }

    #[test]
    fn test_duplicate_waypoint_rejected() {
        let mut chain = Chain::new();
        chain.push(StageSpec::conv(3, 1)).unwrap();
        chain.tag_tail(Waypoint::Prediction).unwrap();
        assert!(chain.tag(Waypoint::Prediction, CutPoint::Source).is_err());
    }

    #[test]
    fn test_scale_at_cut() {
        let mut chain = Chain::new();
        chain.push(StageSpec::conv(400, 160)).unwrap();
        chain.push(StageSpec::conv(4, 2)).unwrap();
        chain.push(StageSpec::upsample(25, 5)).unwrap();
        assert_eq!(
            chain.scale_at(CutPoint::After(1)).unwrap(),
            Scale::unit().times(320)
        );
        assert_eq!(
            chain.scale_at(CutPoint::After(2)).unwrap(),
            Scale::unit().times(64)
        );
    }

    #[test]
    fn test_dump_lists_stages_and_waypoints() {
        let mut chain = Chain::new();
        chain.tag_tail(Waypoint::SampleInput).unwrap();
        chain.push(StageSpec::conv(400, 160).named("mfcc")).unwrap();
        chain.tag_tail(Waypoint::MelInput).unwrap();
        let dump = chain.dump();
        assert!(dump.contains("mfcc"));
        assert!(dump.contains("sample_input"));
        assert!(dump.contains("mel_input"));
        assert!(dump.contains("scale=160"));
    }
}
