//! Terminal rendering of the client surfaces.

use client_core::{
    AuthSurface, ComposerSurface, LikeSurface, Navigator, Notice, PostCard, PostListSurface,
    Route,
};
use shared::domain::{PostId, Principal};
use tracing::debug;

pub struct TerminalSurface;

impl TerminalSurface {
    fn print_notice(&self, notice: Notice) {
        match notice {
            Notice::Info(message) => println!("{message}"),
            Notice::Error(err) => {
                eprintln!("error: {}", err.message());
                if err.requires_reauth() {
                    eprintln!("hint: run `feed_cli login --username <name>` again");
                }
            }
        }
    }
}

impl PostListSurface for TerminalSurface {
    fn show_loading(&self) {
        println!("Loading posts...");
    }

    fn show_empty(&self, message: &str) {
        println!("{message}");
    }

    fn show_error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn render(&self, cards: &[PostCard]) {
        for card in cards {
            println!(
                "#{:<6} {}  {}  likes: {}",
                card.id, card.author, card.posted_at, card.likes
            );
            for line in card.content.lines() {
                println!("        {line}");
            }
        }
    }
}

impl ComposerSurface for TerminalSurface {
    fn set_submit_state(&self, enabled: bool, label: &str) {
        debug!(enabled, label, "submit state");
    }

    fn clear_input(&self) {}

    fn notify(&self, notice: Notice) {
        self.print_notice(notice);
    }
}

impl LikeSurface for TerminalSurface {
    fn set_like_enabled(&self, post_id: PostId, enabled: bool) {
        debug!(%post_id, enabled, "like button");
    }

    fn set_liked(&self, post_id: PostId, liked: bool) {
        if liked {
            println!("liked post #{post_id}");
        }
    }

    fn set_like_count(&self, post_id: PostId, count: u64) {
        debug!(%post_id, count, "like count");
    }

    fn notify(&self, notice: Notice) {
        self.print_notice(notice);
    }
}

impl AuthSurface for TerminalSurface {
    fn show_signed_in(&self, principal: &Principal) {
        println!("signed in as {principal}");
    }

    fn show_signed_out(&self) {
        println!("signed out");
    }

    fn notify(&self, notice: Notice) {
        self.print_notice(notice);
    }
}

pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, route: Route) {
        println!("-> {}", route.path());
    }
}
