// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! CardDAV client validation tool.
//!
//! This is a standalone CLI example for testing the CardDAV client implementation
//! against real CardDAV servers. It serves as both a validation tool and example
//! code for using the CardDavClient API.

use std::error::Error;
use std::io::{Read as _, Write as _};

use aimcal_carddav::{
    AuthMethod, CardDavClient, CardDavConfig, Href, MemoryCache, PropFilter, QueryFilter,
    SyncOptions, SyncToken, TextMatch, synchronize,
};
use clap::{Parser, Subcommand};
use colored::Colorize as _;

/// CardDAV client validation tool.
#[derive(Parser)]
#[command(name = "carddav_cli")]
#[command(about = "CardDAV client validation tool", long_about = None)]
#[command(version)]
struct Cli {
    /// CardDAV server URL
    #[arg(long)]
    server: Option<String>,
    /// Username for basic auth
    #[arg(long)]
    username: Option<String>,
    /// Password for basic auth
    #[arg(long)]
    password: Option<String>,
    /// Bearer token for OAuth
    #[arg(long)]
    token: Option<String>,
    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,
    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Discover address books from a URL, domain or email address
    Discover {
        /// Starting point, defaults to the server URL
        input: Option<String>,
    },
    /// List the address books below an address book home
    ListBooks {
        /// Address book home href
        home: String,
    },
    /// Synchronize an address book and print the changes
    Sync {
        /// Address book href
        book: String,
        /// Token of a previous synchronization
        #[arg(long, default_value = "")]
        since: String,
    },
    /// Search cards by formatted name or email
    Search {
        /// Address book href
        book: String,
        /// Text to search for
        text: String,
    },
    /// Print a card
    Get {
        /// Address book href
        book: String,
        /// Card href
        href: String,
    },
    /// Add a new card
    Add {
        /// Address book href
        book: String,
        /// vCard file path (or "-" for stdin)
        input: String,
    },
    /// Replace an existing card
    Edit {
        /// Address book href
        book: String,
        /// Card href
        href: String,
        /// vCard file path (or "-" for stdin)
        input: String,
    },
    /// Delete a card
    Delete {
        /// Address book href
        book: String,
        /// Card href
        href: String,
    },
}

impl Cli {
    fn build_config(&self) -> Result<CardDavConfig, Box<dyn Error>> {
        // Read from environment variables first
        let server = self
            .server
            .clone()
            .or_else(|| std::env::var("AIM_CARDDAV_SERVER").ok())
            .ok_or_else(|| {
                "AIM_CARDDAV_SERVER must be provided via --server or AIM_CARDDAV_SERVER env var"
                    .to_string()
            })?;

        let username = self
            .username
            .clone()
            .or_else(|| std::env::var("AIM_CARDDAV_USERNAME").ok());
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("AIM_CARDDAV_PASSWORD").ok());
        let token = self
            .token
            .clone()
            .or_else(|| std::env::var("AIM_CARDDAV_TOKEN").ok());

        let auth = if let Some(token) = token {
            AuthMethod::Bearer { token }
        } else if let (Some(username), Some(password)) = (username, password) {
            AuthMethod::Basic { username, password }
        } else {
            AuthMethod::None
        };

        Ok(CardDavConfig {
            base_url: server,
            auth,
            timeout_secs: self.timeout,
            ..Default::default()
        })
    }
}

async fn cmd_discover(client: &CardDavClient, input: Option<&str>) -> Result<(), Box<dyn Error>> {
    let input = input.unwrap_or_else(|| client.base_url().as_str());
    let books = client.discovery().discover(input).await;

    if books.is_empty() {
        println!("{}", "⚠ No address books found".yellow());
        return Ok(());
    }

    println!("{}", "✓ Address books found".green());
    for book in &books {
        let name = book.display_name.as_deref().unwrap_or("Unnamed");
        println!("  {} ({})", book.url, name);
    }
    Ok(())
}

async fn cmd_list_books(client: &CardDavClient, home: &str) -> Result<(), Box<dyn Error>> {
    let home = client.resolve(home)?;
    let books = client.list_address_books(&home).await?;

    if books.is_empty() {
        println!("No address books found");
        return Ok(());
    }

    println!("{:-<100}", "");
    println!("{:<50} {:<20} {:<20}", "Href", "Name", "Description");
    println!("{:-<100}", "");

    for book in &books {
        let name = book.display_name.as_deref().unwrap_or("Unnamed");
        let description = book.description.as_deref().unwrap_or("");
        println!("{:<50} {:<20} {}", book.href.as_str(), name, description);
    }
    Ok(())
}

async fn cmd_sync(client: &CardDavClient, book: &str, since: &str) -> Result<(), Box<dyn Error>> {
    let mut book = client.address_book(book)?;
    let mut cache = MemoryCache::default();
    let outcome = synchronize(
        &mut book,
        &SyncToken::from(since),
        &mut cache,
        &SyncOptions::default(),
    )
    .await?;

    for (href, cached) in cache.iter() {
        println!("{} {} {}", "+".green(), href, cached.etag);
    }
    for failure in &outcome.failures {
        println!("{} {} {}", "!".red(), failure.href, failure.reason);
    }

    println!("\nStrategy: {:?}", outcome.strategy);
    println!("Upserted: {}, deleted: {}", outcome.upserted, outcome.deleted);
    if outcome.truncated {
        println!("{}", "⚠ Result truncated, sync again to continue".yellow());
    }
    println!("Token: {}", outcome.token);
    Ok(())
}

async fn cmd_search(client: &CardDavClient, book: &str, text: &str) -> Result<(), Box<dyn Error>> {
    let book = client.address_book(book)?;
    let filter = QueryFilter::any_of(vec![
        PropFilter::new("FN").text_match(TextMatch::contains(text)),
        PropFilter::new("EMAIL").text_match(TextMatch::contains(text)),
    ]);
    let props = ["FN".to_string(), "EMAIL".to_string(), "UID".to_string()];
    let result = book.query(&filter, &props, None).await?;

    for object in result.objects.values() {
        println!("{}", object.href.as_str().bold());
        for line in object.card.lines() {
            if line.starts_with("FN") || line.starts_with("EMAIL") {
                println!("  {line}");
            }
        }
    }
    if result.truncated {
        println!("{}", "⚠ Server returned partial results".yellow());
    }
    Ok(())
}

async fn cmd_get(client: &CardDavClient, book: &str, href: &str) -> Result<(), Box<dyn Error>> {
    let book = client.address_book(book)?;
    let object = book.get_card(&Href::from(href)).await?;
    println!("ETag: {}", object.etag);
    println!("{}", object.card);
    Ok(())
}

async fn cmd_add(client: &CardDavClient, book: &str, input: &str) -> Result<(), Box<dyn Error>> {
    let mut book = client.address_book(book)?;
    let card = read_vcard(input)?;
    let created = book.create_card(&card).await?;

    println!("{}", "✓ Card created successfully".green());
    println!("Href: {}", created.href);
    println!("UID: {}", created.uid);
    if let Some(etag) = created.etag {
        println!("ETag: {etag}");
    }
    Ok(())
}

async fn cmd_edit(
    client: &CardDavClient,
    book: &str,
    href: &str,
    input: &str,
) -> Result<(), Box<dyn Error>> {
    let book = client.address_book(book)?;
    let href = Href::from(href);

    // Get current card to retrieve ETag
    let current = book.get_card(&href).await?;
    let card = read_vcard(input)?;

    match book.update_card(&href, &card, &current.etag).await? {
        Some(etag) => {
            println!("{}", "✓ Card updated successfully".green());
            println!("Old ETag: {}", current.etag);
            println!("New ETag: {etag}");
        }
        None => println!(
            "{}",
            "⚠ Card changed on the server, fetch it again".yellow()
        ),
    }
    Ok(())
}

async fn cmd_delete(client: &CardDavClient, book: &str, href: &str) -> Result<(), Box<dyn Error>> {
    let book = client.address_book(book)?;
    let href = Href::from(href);
    let current = book.get_card(&href).await?;
    book.delete_card_if_match(&href, &current.etag).await?;

    println!("{}", "✓ Card deleted successfully".green());
    println!("Href: {href}");
    Ok(())
}

fn read_vcard(input: &str) -> Result<String, Box<dyn Error>> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(input)?)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env files (if they exist)
    // Priority: .env.local (highest) -> .env -> existing environment variables (lowest)
    dotenvy::dotenv().ok();
    dotenvy::from_filename(".env.local").ok();

    let cli = Cli::parse();
    let config = cli.build_config()?;
    let client = CardDavClient::new(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        match cli.command {
            Commands::Discover { input } => cmd_discover(&client, input.as_deref()).await,
            Commands::ListBooks { home } => cmd_list_books(&client, &home).await,
            Commands::Sync { book, since } => cmd_sync(&client, &book, &since).await,
            Commands::Search { book, text } => cmd_search(&client, &book, &text).await,
            Commands::Get { book, href } => cmd_get(&client, &book, &href).await,
            Commands::Add { book, input } => cmd_add(&client, &book, &input).await,
            Commands::Edit { book, href, input } => cmd_edit(&client, &book, &href, &input).await,
            Commands::Delete { book, href } => cmd_delete(&client, &book, &href).await,
        }
    });

    if let Err(e) = result {
        // Flush stdout before printing error
        std::io::stdout().flush().ok();
        eprintln!("{} {e}", "Error:".red().bold());
        std::process::exit(1);
    }

    Ok(())
}
