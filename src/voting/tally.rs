use crate::models::{OptionId, OptionResult};

// Live standing of one ballot
#[derive(Debug, Clone, PartialEq)]
pub struct BallotTally {
    pub leader: Option<String>,
    pub leader_id: Option<OptionId>,
    pub summary: String,
    pub total_votes: u64,
    pub counts: Vec<OptionCount>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionCount {
    pub option_id: OptionId,
    pub text: String,
    pub votes: u64,
    pub percentage: f64,
    pub rank: usize,
}

pub fn tally(options: &[OptionResult]) -> BallotTally {
    let total_votes: u64 = options.iter().map(|o| o.votes).sum();

    // Most votes first; equal counts keep the ballot's option order
    let mut sorted: Vec<&OptionResult> = options.iter().collect();
    sorted.sort_by(|a, b| b.votes.cmp(&a.votes));

    let mut counts = Vec::with_capacity(sorted.len());
    let mut rank = 0;
    let mut previous_votes = None;
    for (i, option) in sorted.iter().enumerate() {
        if previous_votes != Some(option.votes) {
            rank = i + 1;
            previous_votes = Some(option.votes);
        }
        counts.push(OptionCount {
            option_id: option.id,
            text: option.text.clone(),
            votes: option.votes,
            percentage: percentage(option.votes, total_votes),
            rank,
        });
    }

    if total_votes == 0 {
        return BallotTally {
            leader: None,
            leader_id: None,
            summary: "No votes were cast.".to_string(),
            total_votes,
            counts,
        };
    }

    let tied_first = counts.iter().filter(|c| c.rank == 1).count() > 1;
    let (leader, leader_id) = if tied_first {
        (None, None)
    } else {
        (Some(counts[0].text.clone()), Some(counts[0].option_id))
    };

    let mut summary = String::new();
    for count in &counts {
        let line = if Some(count.option_id) == leader_id {
            format!("**{}**: {} votes ({:.1}%)", count.text, count.votes, count.percentage)
        } else {
            format!("{}: {} votes ({:.1}%)", count.text, count.votes, count.percentage)
        };
        summary.push_str(&line);
        summary.push('\n');
    }
    if tied_first {
        summary.push_str("\nTied for first place.");
    }
    summary.push_str(&format!("\n{} votes counted.", total_votes));

    BallotTally {
        leader,
        leader_id,
        summary,
        total_votes,
        counts,
    }
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        votes as f64 * 100.0 / total as f64
    }
}
